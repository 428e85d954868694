//! Configuration commands.

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};

/// Dumps the effective configuration as TOML.
pub fn dump(config: &CliConfig) -> CliResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| CliError::Config(format!("failed to serialize config: {e}")))?;
    println!("# config.toml ({})", CliConfig::default_path().display());
    println!("{toml_str}");
    Ok(())
}

/// Validates the configuration, including every connection token reference.
pub fn validate(config: &CliConfig) -> CliResult<()> {
    config.validate()?;

    for settings in &config.connections {
        match settings.token {
            Some(ref token) => {
                crate::secret::resolve(token)?;
                println!("{}: token resolves.", settings.id);
            }
            None => println!("{}: no token configured, sync runs will fail.", settings.id),
        }
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Shows the configuration and state file paths.
pub fn path(config: &CliConfig) -> CliResult<()> {
    println!("config: {}", CliConfig::default_path().display());
    println!("state:  {}", config.state_path().display());
    Ok(())
}
