//! Helpers shared by the adapters to build a [`UnifiedCalendarEvent`].
//!
//! Every adapter reduces its payload to an [`EventTime`] pair plus plain
//! fields; this module turns that into instants in the right timezone and
//! enforces the checks every unified event must pass.

use cadence_core::{
    AttendeeStatus, EventAttendee, EventStatus, EventTime, NaturalKey, UnifiedCalendarEvent,
    parse_timezone,
};
use chrono_tz::Tz;

use crate::connection::CalendarConnection;
use crate::error::NormalizationError;

/// Provider-independent fields extracted from a native event.
#[derive(Debug, Clone)]
pub(crate) struct EventParts {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
    /// Timezone the provider attached to the event, if it names a known zone.
    pub timezone: Option<Tz>,
    pub status: EventStatus,
    pub attendees: Vec<EventAttendee>,
}

impl EventParts {
    /// Resolves the times and assembles the unified event for `connection`.
    ///
    /// All-day and floating times are read in the event's own timezone when
    /// the provider gave one, else in the connection's.
    pub fn into_event(
        self,
        connection: &CalendarConnection,
    ) -> Result<UnifiedCalendarEvent, NormalizationError> {
        if self.id.trim().is_empty() {
            return Err(NormalizationError::missing("id"));
        }
        let tz = self.timezone.unwrap_or(connection.timezone);
        let all_day = self.start.is_all_day();
        let start = self.start.to_instant(tz);
        let end = self.end.to_instant(tz);
        if end < start {
            return Err(NormalizationError::invalid(
                "end",
                format!("ends at {end} before it starts at {start}"),
            ));
        }

        let key = NaturalKey::new(&connection.workspace_id, self.id, &connection.calendar_id);
        let mut event = UnifiedCalendarEvent::new(
            key,
            &connection.id,
            self.title.unwrap_or_default(),
            start,
            end,
        )
        .with_all_day(all_day)
        .with_status(self.status);
        event.description = non_empty(self.description);
        event.location = non_empty(self.location);
        event.timezone = self.timezone.map(|tz| tz.name().to_string());
        event.attendees = dedup_attendees(self.attendees);
        Ok(event)
    }
}

/// A cancelled event that arrived without its times. Providers send these
/// for deletions; the key alone is enough to drop the local copy.
pub(crate) fn cancellation(
    id: String,
    connection: &CalendarConnection,
) -> Result<UnifiedCalendarEvent, NormalizationError> {
    if id.trim().is_empty() {
        return Err(NormalizationError::missing("id"));
    }
    let key = NaturalKey::new(&connection.workspace_id, id, &connection.calendar_id);
    Ok(UnifiedCalendarEvent::cancellation(key, &connection.id))
}

/// Parses an IANA name, ignoring blanks. Unknown names are an error.
pub(crate) fn event_timezone(
    field: &'static str,
    name: Option<&str>,
) -> Result<Option<Tz>, NormalizationError> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => Ok(None),
        Some(name) => parse_timezone(name)
            .map(Some)
            .map_err(|e| NormalizationError::invalid(field, e.to_string())),
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Keeps the first entry per email (case-insensitive), merging the organizer flag.
fn dedup_attendees(attendees: Vec<EventAttendee>) -> Vec<EventAttendee> {
    let mut out: Vec<EventAttendee> = Vec::with_capacity(attendees.len());
    for attendee in attendees {
        if attendee.email.trim().is_empty() {
            continue;
        }
        match out
            .iter_mut()
            .find(|a| a.email.eq_ignore_ascii_case(&attendee.email))
        {
            Some(existing) => {
                existing.organizer |= attendee.organizer;
                if existing.status == AttendeeStatus::Pending {
                    existing.status = attendee.status;
                }
            }
            None => out.push(attendee),
        }
    }
    out
}
