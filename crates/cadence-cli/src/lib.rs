//! The `cadence` command-line interface.
//!
//! Offline access to the engine: recurrence expansion, period bounds,
//! habit streaks, and reconciliation of a file of provider events against
//! a local JSON state file.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;
pub mod state;

pub use cli::Cli;
pub use config::CliConfig;
pub use error::{CliError, CliResult};
