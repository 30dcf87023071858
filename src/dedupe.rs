//! Duplicate channel cleanup.
//!
//! Channels with the exact same name (case-sensitive, any type) form a group.
//! The top-most channel of each group (lowest position, then lowest ID) is kept
//! and the rest are deleted.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::cmp::Ordering;
use std::fmt;

use anyhow::{Context, Result};
use discord_api::{Channel, DiscordClient};
use itertools::Itertools;
use tracing::{info, warn};

/// One set of same-named channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub keep: Channel,
    pub remove: Vec<Channel>,
}

/// Everything a dedupe run would delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupePlan {
    pub groups: Vec<DuplicateGroup>,
}

impl DedupePlan {
    /// Group `channels` and pick a survivor per group.
    pub fn build(channels: Vec<Channel>) -> Self {
        let groups = channels
            .into_iter()
            .filter(|channel| !channel.name_or_empty().is_empty())
            .into_group_map_by(|channel| channel.name_or_empty().to_string())
            .into_values()
            .filter(|group| group.len() > 1)
            .filter_map(|mut group| {
                group.sort_by(top_most);
                let mut members = group.into_iter();
                members.next().map(|keep| DuplicateGroup {
                    keep,
                    remove: members.collect(),
                })
            })
            .sorted_by(|a, b| top_most(&a.keep, &b.keep))
            .collect();
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Channels to delete, in plan order.
    pub fn doomed(&self) -> impl Iterator<Item = &Channel> {
        self.groups.iter().flat_map(|group| group.remove.iter())
    }
}

impl fmt::Display for DedupePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.groups.is_empty() {
            return writeln!(f, "No duplicate channels");
        }
        for group in &self.groups {
            writeln!(
                f,
                "{} #{} keep {} (position {})",
                group.keep.kind_name(),
                group.keep.name_or_empty(),
                group.keep.id,
                group.keep.position
            )?;
            for channel in &group.remove {
                writeln!(
                    f,
                    "  delete {} (position {})",
                    channel.id, channel.position
                )?;
            }
        }
        Ok(())
    }
}

/// Result of executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeReport {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

// Snowflakes compare numerically; fall back to length then text.
fn top_most(a: &Channel, b: &Channel) -> Ordering {
    a.position.cmp(&b.position).then_with(|| {
        match (a.id.parse::<u64>(), b.id.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.id.len().cmp(&b.id.len()).then_with(|| a.id.cmp(&b.id)),
        }
    })
}

/// Fetch the guild's channels and plan the cleanup.
pub async fn plan(client: &DiscordClient, guild_id: &str) -> Result<DedupePlan> {
    let channels = client
        .list_channels(guild_id)
        .await
        .with_context(|| format!("Failed to list channels for guild {guild_id}"))?;
    let plan = DedupePlan::build(channels);
    info!(
        groups = plan.groups.len(),
        doomed = plan.doomed().count(),
        "Planned channel dedupe"
    );
    Ok(plan)
}

/// Delete every doomed channel. Individual failures are collected, not fatal.
pub async fn execute(client: &DiscordClient, plan: &DedupePlan) -> DedupeReport {
    let mut report = DedupeReport::default();
    for channel in plan.doomed() {
        match client.delete_channel(&channel.id).await {
            Ok(()) => {
                info!(channel = %channel.id, name = %channel.name_or_empty(), "Deleted duplicate channel");
                report.deleted.push(channel.id.clone());
            }
            Err(e) => {
                warn!(channel = %channel.id, error = %e, "Failed to delete channel");
                report.failed.push((channel.id.clone(), e.to_string()));
            }
        }
    }
    report
}
