//! CLI command handlers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use discord_api::{DiscordClient, DiscordConfig};
use discord_controller::{
    Controller, ControllerConfig, DiscordClientFactory, LoopConfig, ManifestStore,
    ReconciliationLoop, controller_registry,
};
use tracing::{error, info, warn};

use crate::cli::{Commands, TokenArgs};
use crate::dedupe;
use crate::export::{self, ExportKinds};

/// Execute a CLI command.
///
/// This is the main command dispatcher that routes to the appropriate handler.
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            manifests,
            interval,
            once,
        } => cmd_run(config, manifests, interval, once).await,

        Commands::Export {
            guild,
            out,
            roles,
            channels,
            webhooks,
            invites,
            auth,
        } => {
            let kinds = ExportKinds::from_flags(roles, channels, webhooks, invites);
            cmd_export(&guild, &out, kinds, &auth).await
        }

        Commands::DedupeChannels {
            guild,
            confirm,
            auth,
        } => cmd_dedupe(&guild, confirm, &auth).await,
    }
}

/// Resolve the controller settings: file or environment, then CLI overrides.
pub fn controller_config(
    config: Option<&Path>,
    manifests: Option<PathBuf>,
    interval: Option<u64>,
) -> Result<ControllerConfig> {
    let mut resolved = match config {
        Some(path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig::from_env(),
    };
    if let Some(dir) = manifests {
        resolved = resolved.manifest_dir(dir);
    }
    if let Some(secs) = interval {
        resolved = resolved.poll_interval(Duration::from_secs(secs));
    }
    resolved.validate()?;
    Ok(resolved)
}

/// Run the controller until Ctrl+C, or for a single tick with `--once`.
async fn cmd_run(
    config: Option<PathBuf>,
    manifests: Option<PathBuf>,
    interval: Option<u64>,
    once: bool,
) -> Result<()> {
    let config = controller_config(config.as_deref(), manifests, interval)?;
    info!(
        manifests = %config.manifest_dir.display(),
        interval_secs = config.poll_interval.as_secs(),
        "Starting Discord role controller"
    );

    let store = ManifestStore::new(&config.manifest_dir, controller_registry());
    let factory = Arc::new(DiscordClientFactory::new(config.discord.clone()));
    let controller = Arc::new(Controller::new(store, factory));
    let mut runner = ReconciliationLoop::new(controller, LoopConfig::from(&config));

    if once {
        let summary = runner.reconcile_once().await?;
        println!(
            "Reconciled {} role(s): {} ok, {} failed, {} deferred, {} parked",
            summary.attempted, summary.succeeded, summary.failed, summary.deferred, summary.parked
        );
        if summary.failed > 0 {
            bail!("{} role(s) failed to reconcile", summary.failed);
        }
        return Ok(());
    }

    let stopper = runner.stopper();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        stopper.stop();
    });

    runner.run().await?;
    info!("Controller stopped");
    Ok(())
}

/// Export a guild as manifests.
async fn cmd_export(guild: &str, out: &Path, kinds: ExportKinds, auth: &TokenArgs) -> Result<()> {
    let client = client(auth)?;
    let summary = export::export_guild(&client, guild, out, kinds).await?;
    println!(
        "Exported {} role(s), {} channel(s), {} webhook(s), {} invite(s) to {}",
        summary.roles,
        summary.channels,
        summary.webhooks,
        summary.invites,
        summary.guild_dir.display()
    );
    if summary.skipped_roles > 0 {
        println!(
            "Skipped {} role(s) that Discord manages itself",
            summary.skipped_roles
        );
    }
    Ok(())
}

/// Plan, and with `--confirm` delete, duplicate channels.
async fn cmd_dedupe(guild: &str, confirm: bool, auth: &TokenArgs) -> Result<()> {
    let client = client(auth)?;
    let plan = dedupe::plan(&client, guild).await?;
    print!("{plan}");

    if plan.is_empty() {
        return Ok(());
    }
    if !confirm {
        warn!("Dry run, nothing deleted. Pass --confirm to delete");
        return Ok(());
    }

    let report = dedupe::execute(&client, &plan).await;
    println!("Deleted {} channel(s)", report.deleted.len());
    if !report.failed.is_empty() {
        for (id, reason) in &report.failed {
            error!(channel = %id, %reason, "Channel not deleted");
        }
        bail!("{} channel(s) could not be deleted", report.failed.len());
    }
    Ok(())
}

fn client(auth: &TokenArgs) -> Result<DiscordClient> {
    let token = auth.token.trim();
    if token.is_empty() {
        bail!("A bot token is required (--token or DISCORD_TOKEN)");
    }
    let config = match &auth.api_url {
        Some(url) => DiscordConfig {
            base_url: url.clone(),
            ..DiscordConfig::from_env()
        },
        None => DiscordConfig::from_env(),
    };
    DiscordClient::with_config(token, config).context("Failed to build Discord client")
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
