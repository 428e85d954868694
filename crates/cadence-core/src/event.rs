//! Event types shared by the providers and the sync engine.
//!
//! - [`UnifiedCalendarEvent`]: the provider-agnostic shape every external
//!   event is normalized into before reconciliation
//! - [`NaturalKey`]: identity of a unified event across sync runs
//! - [`ScheduledEvent`] and [`Attendee`]: internal events and their RSVP rows

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::time::TimeWindow;

/// An attendee's response to an invitation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendeeStatus {
    /// Invited, no response yet.
    #[default]
    Pending,
    Accepted,
    Declined,
    Tentative,
}

impl AttendeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Tentative => "tentative",
        }
    }

    /// Returns true if an attendee currently in `self` may move to `next`.
    ///
    /// Any response may be changed to any other response, but nothing goes
    /// back to pending.
    pub fn can_transition_to(self, next: AttendeeStatus) -> bool {
        next != AttendeeStatus::Pending
    }
}

impl fmt::Display for AttendeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttendeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            "tentative" => Ok(Self::Tentative),
            other => Err(format!("unknown attendee status: {other}")),
        }
    }
}

/// Status of an event on the provider side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    /// Cancelled remotely. Reconciliation treats these as absent.
    Cancelled,
}

/// An attendee as listed on a unified event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventAttendee {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub status: AttendeeStatus,
    #[serde(default)]
    pub organizer: bool,
}

impl EventAttendee {
    pub fn new(email: impl Into<String>, status: AttendeeStatus) -> Self {
        Self {
            email: email.into(),
            display_name: None,
            status,
            organizer: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn as_organizer(mut self) -> Self {
        self.organizer = true;
        self
    }
}

/// Identity of a unified event: the same remote event always maps to the
/// same key, whichever sync run fetched it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub workspace_id: String,
    pub provider_event_id: String,
    pub provider_calendar_id: String,
}

impl NaturalKey {
    pub fn new(
        workspace_id: impl Into<String>,
        provider_event_id: impl Into<String>,
        provider_calendar_id: impl Into<String>,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            provider_event_id: provider_event_id.into(),
            provider_calendar_id: provider_calendar_id.into(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.workspace_id, self.provider_calendar_id, self.provider_event_id
        )
    }
}

/// A calendar event normalized from any provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedCalendarEvent {
    pub key: NaturalKey,
    /// Connection the event was fetched through.
    pub connection_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// IANA timezone the provider reported for the event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub all_day: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<EventAttendee>,
    #[serde(default)]
    pub status: EventStatus,
    /// Tombstone. Set when reconciliation no longer finds the event remotely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UnifiedCalendarEvent {
    pub fn new(
        key: NaturalKey,
        connection_id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            connection_id: connection_id.into(),
            title: title.into(),
            description: None,
            start,
            end,
            timezone: None,
            all_day: false,
            location: None,
            attendees: Vec::new(),
            status: EventStatus::Confirmed,
            deleted_at: None,
        }
    }

    /// An event the provider reports as deleted without its details. Only
    /// the key is meaningful; the times sit at the epoch.
    pub fn cancellation(key: NaturalKey, connection_id: impl Into<String>) -> Self {
        Self::new(key, connection_id, "", DateTime::UNIX_EPOCH, DateTime::UNIX_EPOCH)
            .with_status(EventStatus::Cancelled)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    pub fn with_all_day(mut self, all_day: bool) -> Self {
        self.all_day = all_day;
        self
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attendee(mut self, attendee: EventAttendee) -> Self {
        self.attendees.push(attendee);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == EventStatus::Cancelled
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns true if the event intersects `window`.
    pub fn overlaps(&self, window: &TimeWindow) -> bool {
        window.overlaps(self.start, self.end)
    }

    /// Content hash used to detect remote changes.
    ///
    /// Covers title, description, times, timezone, all-day flag, location
    /// and attendees (order independent). Status and tombstone are not part
    /// of it: cancellation is handled as a delete, not as an edit.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for text in [
            Some(self.title.as_str()),
            self.description.as_deref(),
            self.timezone.as_deref(),
            self.location.as_deref(),
        ] {
            hasher.update(text.unwrap_or_default().as_bytes());
            hasher.update([0]);
        }
        hasher.update(self.start.timestamp_millis().to_be_bytes());
        hasher.update(self.end.timestamp_millis().to_be_bytes());
        hasher.update([u8::from(self.all_day)]);

        let mut attendees: Vec<_> = self
            .attendees
            .iter()
            .map(|a| (a.email.to_ascii_lowercase(), a.status.as_str()))
            .collect();
        attendees.sort();
        for (email, status) in attendees {
            hasher.update(email.as_bytes());
            hasher.update([0]);
            hasher.update(status.as_bytes());
            hasher.update([0]);
        }

        hex::encode(hasher.finalize())
    }
}

/// An event owned by this system, which attendees respond to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ScheduledEvent {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            title: title.into(),
            start,
            end,
            deleted_at: None,
        }
    }
}

/// One invited user of a [`ScheduledEvent`].
///
/// `version` increases on every status change and backs the optimistic
/// concurrency check of RSVP updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub event_id: String,
    pub user_id: String,
    pub status: AttendeeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: u64,
}

impl Attendee {
    /// A freshly invited attendee.
    pub fn invited(event_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            user_id: user_id.into(),
            status: AttendeeStatus::Pending,
            responded_at: None,
            version: 0,
        }
    }

    /// Returns this row after a response at `at`, with the version bumped.
    pub fn responded(&self, status: AttendeeStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            responded_at: Some(at),
            version: self.version + 1,
            ..self.clone()
        }
    }
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes
            .as_ref()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}
