//! Google Calendar adapter.
//!
//! Normalizes the event resource returned by the `events.list` endpoint.
//! Timed events carry RFC 3339 `dateTime`s; all-day events carry a `date`
//! with an exclusive end date.

use cadence_core::{AttendeeStatus, EventAttendee, EventStatus, EventTime, UnifiedCalendarEvent};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::adapter::ProviderAdapter;
use crate::connection::{CalendarConnection, ProviderKind};
use crate::error::NormalizationError;
use crate::native::NativeEvent;
use crate::normalize::{EventParts, cancellation, event_timezone};

/// Adapter for Google Calendar events.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleAdapter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEvent {
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    start: Option<ApiEventTime>,
    end: Option<ApiEventTime>,
    status: Option<String>,
    #[serde(default)]
    attendees: Vec<ApiAttendee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date: Option<String>,
    date_time: Option<String>,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAttendee {
    email: Option<String>,
    display_name: Option<String>,
    organizer: Option<bool>,
    response_status: Option<String>,
}

impl ProviderAdapter for GoogleAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn normalize(
        &self,
        native: &NativeEvent,
        connection: &CalendarConnection,
    ) -> Result<UnifiedCalendarEvent, NormalizationError> {
        let NativeEvent::Json(value) = native else {
            return Err(NormalizationError::UnsupportedPayload { provider: "google" });
        };
        let event: ApiEvent = serde_json::from_value(value.clone())
            .map_err(|e| NormalizationError::Malformed(e.to_string()))?;

        let id = event.id.ok_or(NormalizationError::missing("id"))?;
        let status = match event.status.as_deref() {
            Some("cancelled") => EventStatus::Cancelled,
            Some("tentative") => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        };
        // Deleted events come back as little more than an id and a status.
        let (start, end) = match (event.start, event.end) {
            (Some(start), Some(end)) => (start, end),
            _ if status == EventStatus::Cancelled => return cancellation(id, connection),
            (None, _) => return Err(NormalizationError::missing("start")),
            (_, None) => return Err(NormalizationError::missing("end")),
        };

        let timezone = event_timezone("start.timeZone", start.time_zone.as_deref())?;

        let attendees = event
            .attendees
            .into_iter()
            .filter_map(|a| {
                let mut attendee = EventAttendee::new(a.email?, response_status(a.response_status.as_deref()));
                attendee.display_name = a.display_name;
                attendee.organizer = a.organizer.unwrap_or(false);
                Some(attendee)
            })
            .collect();

        EventParts {
            id,
            title: event.summary,
            description: event.description,
            location: event.location,
            start: event_time("start", start)?,
            end: event_time("end", end)?,
            timezone,
            status,
            attendees,
        }
        .into_event(connection)
    }
}

fn event_time(field: &'static str, time: ApiEventTime) -> Result<EventTime, NormalizationError> {
    match (time.date_time, time.date) {
        (Some(dt), _) => DateTime::parse_from_rfc3339(&dt)
            .map(|parsed| EventTime::from_utc(parsed.with_timezone(&Utc)))
            .map_err(|e| NormalizationError::invalid(field, format!("{dt:?}: {e}"))),
        (None, Some(date)) => NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map(EventTime::from_date)
            .map_err(|e| NormalizationError::invalid(field, format!("{date:?}: {e}"))),
        (None, None) => Err(NormalizationError::missing(field)),
    }
}

/// Maps Google's `responseStatus` vocabulary.
fn response_status(status: Option<&str>) -> AttendeeStatus {
    match status {
        Some("accepted") => AttendeeStatus::Accepted,
        Some("declined") => AttendeeStatus::Declined,
        Some("tentative") => AttendeeStatus::Tentative,
        // "needsAction" and anything Google adds later
        _ => AttendeeStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn connection() -> CalendarConnection {
        CalendarConnection::new("conn-g", "ws-1", ProviderKind::Google, "primary")
            .with_timezone(chrono_tz::America::New_York)
    }

    fn normalize(value: serde_json::Value) -> Result<UnifiedCalendarEvent, NormalizationError> {
        GoogleAdapter.normalize(&NativeEvent::json(value), &connection())
    }

    #[test]
    fn timed_event() {
        let event = normalize(json!({
            "id": "g1",
            "summary": "Planning",
            "location": "Room 1",
            "start": {"dateTime": "2024-01-15T10:00:00-05:00", "timeZone": "America/New_York"},
            "end": {"dateTime": "2024-01-15T11:00:00-05:00"},
            "attendees": [
                {"email": "a@example.com", "responseStatus": "accepted", "organizer": true},
                {"email": "b@example.com", "responseStatus": "needsAction", "displayName": "Bee"},
                {"email": "c@example.com", "responseStatus": "declined"},
                {"email": "d@example.com", "responseStatus": "tentative"},
                {"email": "e@example.com", "responseStatus": "maybeLater"},
                {"displayName": "No email"}
            ]
        }))
        .unwrap();

        assert_eq!(event.key.provider_event_id, "g1");
        assert_eq!(event.key.workspace_id, "ws-1");
        assert_eq!(event.connection_id, "conn-g");
        assert_eq!(event.start, Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap());
        assert_eq!(event.end, Utc.with_ymd_and_hms(2024, 1, 15, 16, 0, 0).unwrap());
        assert_eq!(event.timezone.as_deref(), Some("America/New_York"));
        assert!(!event.all_day);

        let statuses: Vec<_> = event.attendees.iter().map(|a| a.status).collect();
        assert_eq!(
            statuses,
            vec![
                AttendeeStatus::Accepted,
                AttendeeStatus::Pending,
                AttendeeStatus::Declined,
                AttendeeStatus::Tentative,
                AttendeeStatus::Pending,
            ]
        );
        assert!(event.attendees[0].organizer);
        assert_eq!(event.attendees[1].display_name.as_deref(), Some("Bee"));
    }

    #[test]
    fn all_day_event_in_connection_timezone() {
        let event = normalize(json!({
            "id": "g2",
            "summary": "Offsite",
            "start": {"date": "2024-02-01"},
            "end": {"date": "2024-02-02"}
        }))
        .unwrap();
        assert!(event.all_day);
        assert_eq!(event.start, Utc.with_ymd_and_hms(2024, 2, 1, 5, 0, 0).unwrap());
        assert_eq!(event.end, Utc.with_ymd_and_hms(2024, 2, 2, 5, 0, 0).unwrap());
        assert_eq!(event.timezone, None);
    }

    #[test]
    fn cancelled_status() {
        let event = normalize(json!({
            "id": "g3",
            "status": "cancelled",
            "start": {"dateTime": "2024-01-15T10:00:00Z"},
            "end": {"dateTime": "2024-01-15T10:30:00Z"}
        }))
        .unwrap();
        assert!(event.is_cancelled());
    }

    #[test]
    fn cancelled_without_times() {
        let event = normalize(json!({"id": "gone", "status": "cancelled"})).unwrap();
        assert!(event.is_cancelled());
        assert_eq!(event.key.provider_event_id, "gone");
        assert_eq!(event.key.provider_calendar_id, "primary");
        assert_eq!(event.connection_id, "conn-g");

        let blank = normalize(json!({"id": " ", "status": "cancelled"}));
        assert_eq!(blank, Err(NormalizationError::missing("id")));
    }

    #[test]
    fn malformed_fields() {
        let missing_start = normalize(json!({"id": "x", "end": {"date": "2024-01-01"}}));
        assert_eq!(missing_start, Err(NormalizationError::missing("start")));

        let bad_time = normalize(json!({
            "id": "x",
            "start": {"dateTime": "yesterday"},
            "end": {"dateTime": "2024-01-15T10:30:00Z"}
        }));
        assert!(matches!(bad_time, Err(NormalizationError::InvalidField { field: "start", .. })));

        let wrong_type = normalize(json!({"id": 42}));
        assert!(matches!(wrong_type, Err(NormalizationError::Malformed(_))));

        let ical = GoogleAdapter.normalize(&NativeEvent::ical("BEGIN:VCALENDAR"), &connection());
        assert_eq!(ical, Err(NormalizationError::UnsupportedPayload { provider: "google" }));
    }
}
