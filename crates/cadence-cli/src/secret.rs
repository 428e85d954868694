//! Token references in `config.toml`.
//!
//! A connection's `token` is never stored in the state file. It is read
//! from wherever the reference points:
//!
//! - `pass::path/in/store` runs `pass show path/in/store` and takes the first line
//! - `env::VAR_NAME` reads `$VAR_NAME`
//! - anything else is the token itself

use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("failed to run `pass show {path}`: {message}")]
    Spawn { path: String, message: String },

    #[error("`pass show {path}` failed ({status}): {stderr}")]
    PassFailed {
        path: String,
        status: String,
        stderr: String,
    },

    #[error("`pass show {path}` produced no output")]
    EmptyPass { path: String },

    #[error("environment variable `{0}` is not set")]
    MissingEnv(String),
}

/// Where a token comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretRef<'a> {
    Pass(&'a str),
    Env(&'a str),
    Plain(&'a str),
}

impl<'a> SecretRef<'a> {
    pub fn parse(value: &'a str) -> Self {
        if let Some(path) = value.strip_prefix("pass::") {
            Self::Pass(path)
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else {
            Self::Plain(value)
        }
    }

    pub fn resolve(self) -> Result<String, SecretError> {
        match self {
            Self::Pass(path) => from_pass(path),
            Self::Env(var) => std::env::var(var).map_err(|_| SecretError::MissingEnv(var.to_string())),
            Self::Plain(value) => Ok(value.to_string()),
        }
    }
}

/// Resolves a value that may be a secret reference.
pub fn resolve(value: &str) -> Result<String, SecretError> {
    SecretRef::parse(value).resolve()
}

fn from_pass(path: &str) -> Result<String, SecretError> {
    let output = Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| SecretError::Spawn {
            path: path.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(SecretError::PassFailed {
            path: path.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SecretError::EmptyPass {
            path: path.to_string(),
        })
}
