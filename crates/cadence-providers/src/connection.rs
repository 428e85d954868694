//! Calendar connections and the opaque credentials attached to them.

use std::fmt;
use std::str::FromStr;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// The external calendar service behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Google,
    Microsoft,
    #[serde(rename = "caldav")]
    CalDav,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Microsoft => "microsoft",
            Self::CalDav => "caldav",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "microsoft" | "outlook" => Ok(Self::Microsoft),
            "caldav" => Ok(Self::CalDav),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// One external calendar account linked to a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConnection {
    pub id: String,
    pub workspace_id: String,
    pub provider: ProviderKind,
    #[serde(default)]
    pub account_email: Option<String>,
    /// Provider calendar id synced through this connection.
    pub calendar_id: String,
    /// Reference handed to the credential store. Never the token itself.
    pub credential_ref: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Calendar timezone, used for all-day and floating times.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

fn default_active() -> bool {
    true
}

fn default_timezone() -> Tz {
    Tz::UTC
}

impl CalendarConnection {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        provider: ProviderKind,
        calendar_id: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            credential_ref: id.clone(),
            id,
            workspace_id: workspace_id.into(),
            provider,
            account_email: None,
            calendar_id: calendar_id.into(),
            active: true,
            timezone: Tz::UTC,
        }
    }

    pub fn with_account_email(mut self, email: impl Into<String>) -> Self {
        self.account_email = Some(email.into());
        self
    }

    pub fn with_credential_ref(mut self, credential_ref: impl Into<String>) -> Self {
        self.credential_ref = credential_ref.into();
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// An access token as handed out by the credential store.
///
/// Opaque: never parsed, refreshed or logged here.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the transport layer only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_round_trips_through_str() {
        for kind in [ProviderKind::Google, ProviderKind::Microsoft, ProviderKind::CalDav] {
            assert_eq!(kind.as_str().parse::<ProviderKind>(), Ok(kind));
        }
        assert_eq!("Outlook".parse::<ProviderKind>(), Ok(ProviderKind::Microsoft));
        assert!("exchange".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn connection_defaults() {
        let conn = CalendarConnection::new("c1", "ws", ProviderKind::Google, "primary");
        assert!(conn.active);
        assert_eq!(conn.credential_ref, "c1");
        assert_eq!(conn.timezone, Tz::UTC);

        let json = r#"{"id":"c2","workspace_id":"ws","provider":"caldav","calendar_id":"work","credential_ref":"vault:7"}"#;
        let conn: CalendarConnection = serde_json::from_str(json).unwrap();
        assert_eq!(conn.provider, ProviderKind::CalDav);
        assert!(conn.active);
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = AccessToken::new("ya29.secret");
        assert_eq!(format!("{token:?}"), "AccessToken(<redacted>)");
        assert_eq!(token.expose(), "ya29.secret");
    }
}
