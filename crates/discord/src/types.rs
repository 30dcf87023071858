//! Wire types for the Discord REST API.
//!
//! Snowflake IDs stay as strings, the way Discord serializes them.
//! Request payloads skip unset fields so Discord keeps its own defaults.

use serde::{Deserialize, Serialize};

/// A guild role as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    #[serde(default)]
    pub position: i32,
    /// Permission bit set, serialized as a decimal string.
    #[serde(default)]
    pub permissions: String,
    /// Set by Discord for roles owned by an integration or bot.
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub mentionable: bool,
}

impl Role {
    /// The `@everyone` role shares its ID with the guild.
    pub fn is_everyone(&self, guild_id: &str) -> bool {
        self.id == guild_id
    }
}

/// Body of `POST /guilds/{guild.id}/roles`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRole {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hoist: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentionable: Option<bool>,
}

/// Body of `PATCH /guilds/{guild.id}/roles/{role.id}`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyRole {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hoist: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentionable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i32>,
}

impl ModifyRole {
    /// A modify request that only moves the role.
    pub const fn position(position: i32) -> Self {
        Self {
            name: None,
            permissions: None,
            color: None,
            hoist: None,
            mentionable: None,
            position: Some(position),
        }
    }

    /// Check whether the request would change nothing.
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.permissions.is_none()
            && self.color.is_none()
            && self.hoist.is_none()
            && self.mentionable.is_none()
            && self.position.is_none()
    }
}

/// A guild, trimmed to what the tools need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A guild channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub nsfw: bool,
}

impl Channel {
    /// Channel name, or an empty string for unnamed channels.
    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Human readable channel type.
    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            0 => "text",
            2 => "voice",
            4 => "category",
            5 => "announcement",
            13 => "stage",
            15 => "forum",
            16 => "media",
            _ => "other",
        }
    }
}

/// A channel webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// The channel an invite points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteChannel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// A guild invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub code: String,
    #[serde(default)]
    pub channel: Option<InviteChannel>,
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub temporary: Option<bool>,
}

/// Error body Discord attaches to non-success responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub code: u64,
    #[serde(default)]
    pub message: String,
}

/// Body of a 429 response.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RateLimitBody {
    /// Seconds to wait, fractional.
    pub retry_after: f64,
}
