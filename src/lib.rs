#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # discord-provider
//!
//! Declarative Discord roles. The `run` command drives the manifest
//! controller; `export` and `dedupe-channels` are one-shot guild tools.

pub mod cli;
pub mod commands;
pub mod dedupe;
pub mod export;

pub use cli::{Cli, Commands, TokenArgs};
pub use commands::execute_command;
