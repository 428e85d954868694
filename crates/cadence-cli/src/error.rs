//! CLI error types.

use std::path::PathBuf;

use cadence_core::{InvalidRuleError, TimezoneError, TracingError};
use cadence_sync::SyncError;
use thiserror::Error;

use crate::secret::SecretError;

/// Errors surfaced by the `cadence` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file could not be read, parsed or validated.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to render JSON: {0}")]
    Render(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidRule(#[from] InvalidRuleError),

    #[error(transparent)]
    Timezone(#[from] TimezoneError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("failed to initialize logging: {0}")]
    Tracing(#[from] TracingError),

    #[error("no connection named `{0}` in the configuration")]
    UnknownConnection(String),

    #[error("sync run {run_id} failed: {message}")]
    RunFailed { run_id: String, message: String },
}

impl CliError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = CliError::io(
            "/tmp/state.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.to_string(), "I/O error on /tmp/state.json: missing");
    }

    #[test]
    fn run_failure_display() {
        let err = CliError::RunFailed {
            run_id: "abc".into(),
            message: "credential invalid".into(),
        };
        assert_eq!(err.to_string(), "sync run abc failed: credential invalid");
    }
}
