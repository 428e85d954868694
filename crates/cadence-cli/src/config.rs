//! CLI configuration.
//!
//! All settings live in `~/.config/cadence/config.toml` by default:
//!
//! ```toml
//! timezone = "Europe/Paris"
//!
//! [sync]
//! past_window = 604800
//! page_size = 100
//!
//! [[connections]]
//! id = "work"
//! provider = "google"
//! calendar_id = "primary"
//! token = "env::CADENCE_WORK_TOKEN"
//! ```
//!
//! Connection tokens accept the references described in [`crate::secret`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use cadence_core::{MAX_TREND_WEEKS, TimezoneError, parse_timezone};
use cadence_providers::{CalendarConnection, ProviderKind};
use cadence_sync::{SyncConfig, TrackerConfig};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

const APP_DIR: &str = "cadence";

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// IANA timezone for commands without `--timezone`. UTC when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Debug logging.
    pub debug: bool,

    /// JSON state file used by `cadence sync`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    pub sync: SyncConfig,

    pub habits: HabitSettings,

    pub connections: Vec<ConnectionSettings>,
}

/// Habit report settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HabitSettings {
    /// Weeks covered by the trend.
    pub trend_weeks: u32,
}

impl Default for HabitSettings {
    fn default() -> Self {
        Self { trend_weeks: 8 }
    }
}

/// One `[[connections]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub id: String,

    #[serde(default = "default_workspace")]
    pub workspace_id: String,

    pub provider: ProviderKind,

    #[serde(default = "default_calendar")]
    pub calendar_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,

    /// Calendar timezone for all-day and floating event times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Access token or a secret reference to it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_workspace() -> String {
    "default".to_string()
}

fn default_calendar() -> String {
    "primary".to_string()
}

fn default_active() -> bool {
    true
}

impl ConnectionSettings {
    /// Builds the connection handed to the sync engine. The credential
    /// reference is the connection id.
    pub fn to_connection(&self) -> Result<CalendarConnection, TimezoneError> {
        let mut connection = CalendarConnection::new(
            &self.id,
            &self.workspace_id,
            self.provider,
            &self.calendar_id,
        )
        .with_active(self.active);
        if let Some(ref email) = self.account_email {
            connection = connection.with_account_email(email);
        }
        if let Some(ref tz) = self.timezone {
            connection = connection.with_timezone(parse_timezone(tz)?);
        }
        Ok(connection)
    }
}

impl CliConfig {
    /// Loads configuration from the default path, or defaults when the file
    /// does not exist.
    pub fn load() -> CliResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> CliResult<Self> {
        toml::from_str(content).map_err(|e| CliError::Config(format!("failed to parse config: {e}")))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// State file for `cadence sync`: the configured one, else `state.json`
    /// in the data directory.
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("state.json"))
    }

    /// The configured timezone, UTC when unset.
    pub fn timezone(&self) -> Result<Tz, TimezoneError> {
        self.timezone.as_deref().map_or(Ok(Tz::UTC), parse_timezone)
    }

    pub fn connection(&self, id: &str) -> CliResult<&ConnectionSettings> {
        self.connections
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| CliError::UnknownConnection(id.to_string()))
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig::default().with_trend_weeks(self.habits.trend_weeks)
    }

    /// Checks everything that can be checked without network or secrets.
    pub fn validate(&self) -> CliResult<()> {
        self.timezone()?;

        if self.sync.page_size == 0 {
            return Err(CliError::Config("sync.page_size must be at least 1".into()));
        }
        if self.sync.max_concurrent_runs == 0 {
            return Err(CliError::Config(
                "sync.max_concurrent_runs must be at least 1".into(),
            ));
        }
        if self.sync.run_deadline.is_zero() {
            return Err(CliError::Config("sync.run_deadline must be positive".into()));
        }
        if self.habits.trend_weeks == 0 {
            return Err(CliError::Config("habits.trend_weeks must be at least 1".into()));
        }
        if self.habits.trend_weeks > MAX_TREND_WEEKS {
            return Err(CliError::Config(format!(
                "habits.trend_weeks must be at most {MAX_TREND_WEEKS}"
            )));
        }

        let mut seen = HashSet::new();
        for settings in &self.connections {
            if settings.id.trim().is_empty() {
                return Err(CliError::Config("connection id must not be empty".into()));
            }
            if !seen.insert(settings.id.as_str()) {
                return Err(CliError::Config(format!(
                    "duplicate connection id `{}`",
                    settings.id
                )));
            }
            settings.to_connection()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const FULL: &str = r#"
timezone = "Europe/Paris"
debug = true

[sync]
past_window = 86400
page_size = 50

[habits]
trend_weeks = 4

[[connections]]
id = "work"
provider = "google"
account_email = "me@example.com"
token = "env::CADENCE_WORK_TOKEN"

[[connections]]
id = "home"
workspace_id = "family"
provider = "caldav"
calendar_id = "personal"
timezone = "America/New_York"
active = false
"#;

    #[test]
    fn empty_file_is_default() {
        let config = CliConfig::parse("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.timezone().unwrap(), Tz::UTC);
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.habits.trend_weeks, 8);
    }

    #[test]
    fn full_file() {
        let config = CliConfig::parse(FULL).unwrap();
        assert!(config.debug);
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Paris);
        assert_eq!(config.sync.past_window, Duration::from_secs(86400));
        assert_eq!(config.sync.page_size, 50);
        // Unset keys keep their defaults.
        assert_eq!(config.sync.max_concurrent_runs, 4);
        assert_eq!(config.tracker_config().trend_weeks, 4);
        assert_eq!(config.connections.len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn connection_defaults_and_conversion() {
        let config = CliConfig::parse(FULL).unwrap();

        let work = config.connection("work").unwrap().to_connection().unwrap();
        assert_eq!(work.workspace_id, "default");
        assert_eq!(work.calendar_id, "primary");
        assert_eq!(work.credential_ref, "work");
        assert_eq!(work.account_email.as_deref(), Some("me@example.com"));
        assert!(work.active);

        let home = config.connection("home").unwrap().to_connection().unwrap();
        assert_eq!(home.provider, ProviderKind::CalDav);
        assert_eq!(home.timezone, chrono_tz::America::New_York);
        assert!(!home.active);
    }

    #[test]
    fn unknown_connection() {
        let config = CliConfig::parse(FULL).unwrap();
        assert!(matches!(
            config.connection("nope"),
            Err(CliError::UnknownConnection(id)) if id == "nope"
        ));
    }

    #[test]
    fn validate_rejects_bad_timezone() {
        let config = CliConfig::parse("timezone = \"Mars/Olympus\"").unwrap();
        assert!(matches!(config.validate(), Err(CliError::Timezone(_))));
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let config = CliConfig::parse(
            r#"
[[connections]]
id = "a"
provider = "google"

[[connections]]
id = "a"
provider = "microsoft"
"#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate connection id `a`"));
    }

    #[test]
    fn validate_rejects_zero_page_size() {
        let config = CliConfig::parse("[sync]\npage_size = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_trend() {
        let config = CliConfig::parse("[habits]\ntrend_weeks = 100000\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at most 520"));
    }

    #[test]
    fn unknown_provider_fails_to_parse() {
        let result = CliConfig::parse("[[connections]]\nid = \"x\"\nprovider = \"yahoo\"\n");
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        let config = CliConfig::load_from(file.path()).unwrap();
        assert_eq!(config.connections[0].id, "work");
    }

    #[test]
    fn load_from_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = CliConfig::load_from(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn dump_round_trips() {
        let config = CliConfig::parse(FULL).unwrap();
        let dumped = toml::to_string_pretty(&config).unwrap();
        assert_eq!(CliConfig::parse(&dumped).unwrap(), config);
    }

    #[test]
    fn explicit_state_file_wins() {
        let config = CliConfig::parse("state_file = \"/var/lib/cadence/state.json\"").unwrap();
        assert_eq!(config.state_path(), PathBuf::from("/var/lib/cadence/state.json"));
        assert!(CliConfig::default().state_path().ends_with("cadence/state.json"));
    }
}
