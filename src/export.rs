//! Guild export: dump an existing guild as manifests.
//!
//! Output layout is `<out>/<guild-slug>/<kind>/<slug>.yaml`. Role manifests
//! carry the external-name annotation so the controller adopts the existing
//! roles instead of creating new ones.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use discord_api::{Channel, DiscordClient, Guild, Invite, Webhook};
use discord_reconciler::{API_VERSION, ObjectMeta, Role, RoleParameters};
use serde::Serialize;
use tracing::{debug, info};

/// Which kinds to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportKinds {
    pub roles: bool,
    pub channels: bool,
    pub webhooks: bool,
    pub invites: bool,
}

impl ExportKinds {
    /// Every kind.
    pub const fn all() -> Self {
        Self {
            roles: true,
            channels: true,
            webhooks: true,
            invites: true,
        }
    }

    /// The flags as given, or everything when none is set.
    pub const fn from_flags(roles: bool, channels: bool, webhooks: bool, invites: bool) -> Self {
        if roles || channels || webhooks || invites {
            Self {
                roles,
                channels,
                webhooks,
                invites,
            }
        } else {
            Self::all()
        }
    }
}

/// Files written per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub guild_dir: PathBuf,
    pub roles: usize,
    pub channels: usize,
    pub webhooks: usize,
    pub invites: usize,
    /// `@everyone` and integration-managed roles.
    pub skipped_roles: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<P> {
    api_version: &'static str,
    kind: &'static str,
    metadata: ObjectMeta,
    spec: Spec<P>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Spec<P> {
    for_provider: P,
}

impl<P> Manifest<P> {
    fn new(kind: &'static str, name: String, for_provider: P) -> Self {
        Self {
            api_version: API_VERSION,
            kind,
            metadata: ObjectMeta::named(name),
            spec: Spec { for_provider },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChannelParameters<'a> {
    guild_id: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    position: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    nsfw: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookParameters<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteParameters<'a> {
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_uses: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temporary: Option<bool>,
}

/// Lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Hands out file stems, falling back to the ID on empty or repeated slugs.
#[derive(Debug, Default)]
struct Names {
    taken: HashSet<String>,
}

impl Names {
    fn claim(&mut self, name: &str, id: &str) -> String {
        let slug = slugify(name);
        let stem = if slug.is_empty() {
            id.to_string()
        } else if self.taken.contains(&slug) {
            format!("{slug}-{id}")
        } else {
            slug
        };
        self.taken.insert(stem.clone());
        stem
    }
}

/// Build the manifest the controller would adopt for an existing role.
pub fn role_manifest(guild_id: &str, role: &discord_api::Role, name: &str) -> Role {
    let parameters = RoleParameters::new(guild_id, role.name.clone())
        .with_color(role.color)
        .with_hoist(role.hoist)
        .with_mentionable(role.mentionable)
        .with_permissions(role.permissions.clone());
    Role::new(name, parameters).with_external_name(role.id.clone())
}

/// Export a guild to `out`.
pub async fn export_guild(
    client: &DiscordClient,
    guild_id: &str,
    out: &Path,
    kinds: ExportKinds,
) -> Result<ExportSummary> {
    let guild = client
        .get_guild(guild_id)
        .await
        .with_context(|| format!("Failed to fetch guild {guild_id}"))?;
    let guild_dir = out.join(guild_dir_name(&guild));
    info!(guild = %guild.name, dir = %guild_dir.display(), "Exporting guild");

    let mut summary = ExportSummary {
        guild_dir: guild_dir.clone(),
        ..Default::default()
    };

    if kinds.roles {
        let roles = client
            .list_roles(guild_id)
            .await
            .context("Failed to list roles")?;
        let dir = kind_dir(&guild_dir, "roles")?;
        let mut names = Names::default();
        for role in &roles {
            if role.is_everyone(guild_id) || role.managed {
                debug!(role = %role.name, "Skipping role");
                summary.skipped_roles += 1;
                continue;
            }
            let stem = names.claim(&role.name, &role.id);
            write_yaml(&dir, &stem, &role_manifest(guild_id, role, &stem))?;
            summary.roles += 1;
        }
    }

    if kinds.channels {
        let channels = client
            .list_channels(guild_id)
            .await
            .context("Failed to list channels")?;
        let dir = kind_dir(&guild_dir, "channels")?;
        let mut names = Names::default();
        for channel in &channels {
            let stem = names.claim(channel.name_or_empty(), &channel.id);
            write_yaml(&dir, &stem, &channel_manifest(guild_id, channel, &stem))?;
            summary.channels += 1;
        }
    }

    if kinds.webhooks {
        let webhooks = client
            .list_webhooks(guild_id)
            .await
            .context("Failed to list webhooks")?;
        let dir = kind_dir(&guild_dir, "webhooks")?;
        let mut names = Names::default();
        for webhook in &webhooks {
            let stem = names.claim(webhook.name.as_deref().unwrap_or_default(), &webhook.id);
            write_yaml(&dir, &stem, &webhook_manifest(webhook, &stem))?;
            summary.webhooks += 1;
        }
    }

    if kinds.invites {
        let invites = client
            .list_invites(guild_id)
            .await
            .context("Failed to list invites")?;
        let dir = kind_dir(&guild_dir, "invites")?;
        let mut names = Names::default();
        for invite in &invites {
            let stem = names.claim(&invite.code, &invite.code);
            write_yaml(&dir, &stem, &invite_manifest(invite, &stem))?;
            summary.invites += 1;
        }
    }

    info!(
        roles = summary.roles,
        channels = summary.channels,
        webhooks = summary.webhooks,
        invites = summary.invites,
        skipped_roles = summary.skipped_roles,
        "Export complete"
    );
    Ok(summary)
}

fn guild_dir_name(guild: &Guild) -> String {
    let slug = slugify(&guild.name);
    if slug.is_empty() { guild.id.clone() } else { slug }
}

fn kind_dir(guild_dir: &Path, kind: &str) -> Result<PathBuf> {
    let dir = guild_dir.join(kind);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    Ok(dir)
}

fn write_yaml<T: Serialize>(dir: &Path, stem: &str, manifest: &T) -> Result<()> {
    let path = dir.join(format!("{stem}.yaml"));
    let yaml = serde_yaml::to_string(manifest)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    std::fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), "Wrote manifest");
    Ok(())
}

fn channel_manifest<'a>(
    guild_id: &'a str,
    channel: &'a Channel,
    name: &str,
) -> Manifest<ChannelParameters<'a>> {
    Manifest::new(
        "Channel",
        name.to_string(),
        ChannelParameters {
            guild_id,
            name: channel.name_or_empty(),
            kind: channel.kind_name(),
            position: channel.position,
            parent_id: channel.parent_id.as_deref(),
            topic: channel.topic.as_deref(),
            nsfw: channel.nsfw,
        },
    )
}

fn webhook_manifest<'a>(webhook: &'a Webhook, name: &str) -> Manifest<WebhookParameters<'a>> {
    Manifest::new(
        "Webhook",
        name.to_string(),
        WebhookParameters {
            name: webhook.name.as_deref().unwrap_or_default(),
            channel_id: webhook.channel_id.as_deref(),
        },
    )
}

fn invite_manifest<'a>(invite: &'a Invite, name: &str) -> Manifest<InviteParameters<'a>> {
    Manifest::new(
        "Invite",
        name.to_string(),
        InviteParameters {
            code: &invite.code,
            channel_id: invite.channel.as_ref().map(|c| c.id.as_str()),
            max_age: invite.max_age,
            max_uses: invite.max_uses,
            temporary: invite.temporary,
        },
    )
}
