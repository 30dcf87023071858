//! Manifest-driven controller for Discord roles.
//!
//! Reads `Role`, `ProviderConfig` and `Secret` manifests from a directory,
//! reconciles every role against Discord on a fixed interval and writes the
//! binding and status conditions back into the manifest files.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use discord_controller::{
//!     Controller, ControllerConfig, DiscordClientFactory, LoopConfig, ManifestStore,
//!     ReconciliationLoop, controller_registry,
//! };
//!
//! let config = ControllerConfig::from_env();
//! let store = ManifestStore::new(&config.manifest_dir, controller_registry());
//! let factory = Arc::new(DiscordClientFactory::new(config.discord.clone()));
//! let controller = Arc::new(Controller::new(store, factory));
//!
//! let mut runner = ReconciliationLoop::new(controller, LoopConfig::from(&config));
//! runner.run().await?;
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod config;
pub mod driver;
pub mod error;
pub mod r#loop;
pub mod provider;
pub mod store;

// Re-export main types
pub use config::ControllerConfig;
pub use driver::{Controller, PassOutcome, reconcile_role};
pub use error::{Error, Result};
pub use r#loop::{LoopConfig, LoopStopper, ReconciliationLoop, TickSummary, calculate_backoff};
pub use provider::{
    ClientFactory, CredentialsSource, DiscordClientFactory, EnvLookup, ProviderConfig,
    ProviderConnector, Secret,
};
pub use store::{ManifestStore, Snapshot, StoredRecord, controller_registry};
