#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # discord-api
//!
//! Typed client for the parts of the Discord REST API the provider manages
//! or inspects: guild roles, channels, webhooks and invites.
//!
//! ## Example
//!
//! ```ignore
//! use discord_api::{CreateRole, DiscordClient};
//!
//! let client = DiscordClient::new(std::env::var("DISCORD_TOKEN")?)?;
//! let role = client
//!     .create_role("81384788765712384", &CreateRole { name: "Admin".into(), ..Default::default() })
//!     .await?;
//! println!("created {}", role.id);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used items
pub use client::DiscordClient;
pub use config::{DEFAULT_BASE_URL, DiscordConfig};
pub use error::{Error, Result};
pub use types::{Channel, CreateRole, Guild, Invite, InviteChannel, ModifyRole, Role, Webhook};
