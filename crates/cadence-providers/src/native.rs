//! Provider-native event payloads, as fetched and before normalization.

use serde::{Deserialize, Serialize};

/// One event exactly as the provider returned it.
///
/// JSON providers (Google, Microsoft Graph) hand over the event object;
/// CalDAV hands over the iCalendar text of the calendar resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "payload", rename_all = "snake_case")]
pub enum NativeEvent {
    Json(serde_json::Value),
    Ical(String),
}

impl NativeEvent {
    pub fn json(value: serde_json::Value) -> Self {
        Self::Json(value)
    }

    pub fn ical(text: impl Into<String>) -> Self {
        Self::Ical(text.into())
    }

    /// Best-effort identifier for log lines, without parsing the payload fully.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::Json(value) => value.get("id").and_then(|id| id.as_str()).map(str::to_string),
            Self::Ical(text) => text
                .lines()
                .find_map(|line| line.trim().strip_prefix("UID:"))
                .map(|uid| uid.trim().to_string()),
        }
    }
}
