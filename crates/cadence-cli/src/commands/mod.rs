//! Subcommand implementations.

pub mod bounds;
pub mod config;
pub mod expand;
pub mod streak;
pub mod sync;

use serde::Serialize;

use crate::error::CliResult;

/// Prints `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
