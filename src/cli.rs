//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// discord-provider - declarative Discord roles
#[derive(Parser, Debug)]
#[command(name = "discord-provider")]
#[command(version)]
#[command(about = "Keep Discord roles in sync with YAML manifests")]
#[command(
    long_about = "Reconciles Role manifests against a Discord guild, exports an existing guild as manifests, and cleans up duplicate channels."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Bot credentials for the one-shot tools.
#[derive(Args, Debug, Clone)]
pub struct TokenArgs {
    /// Bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Discord API base URL
    #[arg(long, env = "DISCORD_API_URL")]
    pub api_url: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller
    Run {
        /// Controller config file (TOML or JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Manifest directory (overrides the config)
        #[arg(short, long)]
        manifests: Option<PathBuf>,

        /// Seconds between reconciliation ticks (overrides the config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Reconcile once and exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },

    /// Export a guild's roles, channels, webhooks and invites as manifests
    ///
    /// Files land in OUT/<guild-slug>/<kind>/<name>.yaml. `run --manifests
    /// OUT/<guild-slug>` adopts the exported roles once a ProviderConfig and
    /// its Secret are added there; export writes no credentials.
    Export {
        /// Guild ID
        #[arg(short, long)]
        guild: String,

        /// Output directory
        #[arg(short, long, default_value = "exported")]
        out: PathBuf,

        /// Export roles
        #[arg(long, default_value_t = false)]
        roles: bool,

        /// Export channels
        #[arg(long, default_value_t = false)]
        channels: bool,

        /// Export webhooks
        #[arg(long, default_value_t = false)]
        webhooks: bool,

        /// Export invites
        #[arg(long, default_value_t = false)]
        invites: bool,

        #[command(flatten)]
        auth: TokenArgs,
    },

    /// Delete channels that share a name, keeping the top-most one
    DedupeChannels {
        /// Guild ID
        #[arg(short, long)]
        guild: String,

        /// Actually delete (default is a dry run)
        #[arg(long, default_value_t = false)]
        confirm: bool,

        #[command(flatten)]
        auth: TokenArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::try_parse_from([
            "discord-provider",
            "run",
            "--manifests",
            "/srv/manifests",
            "--interval",
            "15",
            "--once",
        ]);
        assert!(matches!(
            cli,
            Ok(Cli {
                command: Commands::Run {
                    interval: Some(15),
                    once: true,
                    ..
                }
            })
        ));
    }

    #[test]
    fn test_dedupe_defaults_to_dry_run() {
        let cli = Cli::try_parse_from([
            "discord-provider",
            "dedupe-channels",
            "--guild",
            "100",
            "--token",
            "abc",
        ]);
        assert!(matches!(
            cli,
            Ok(Cli {
                command: Commands::DedupeChannels { confirm: false, .. }
            })
        ));
    }
}
