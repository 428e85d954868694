//! Microsoft Graph (Outlook) calendar adapter.
//!
//! Graph reports `start`/`end` as a wall-clock `dateTime` (no offset, up to
//! seven fractional digits) plus a `timeZone` name, which may be an IANA
//! identifier or a Windows zone name.

use cadence_core::{
    AttendeeStatus, EventAttendee, EventStatus, EventTime, UnifiedCalendarEvent, parse_timezone,
    time::resolve_local,
};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use serde::Deserialize;

use crate::adapter::ProviderAdapter;
use crate::connection::{CalendarConnection, ProviderKind};
use crate::error::NormalizationError;
use crate::native::NativeEvent;
use crate::normalize::{EventParts, cancellation};

/// Adapter for Microsoft Graph events.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrosoftAdapter;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEvent {
    id: Option<String>,
    subject: Option<String>,
    body_preview: Option<String>,
    body: Option<GraphBody>,
    start: Option<GraphDateTime>,
    end: Option<GraphDateTime>,
    #[serde(default)]
    is_all_day: bool,
    #[serde(default)]
    is_cancelled: bool,
    #[serde(rename = "@removed")]
    removed: Option<serde_json::Value>,
    show_as: Option<String>,
    location: Option<GraphLocation>,
    organizer: Option<GraphRecipient>,
    #[serde(default)]
    attendees: Vec<GraphAttendee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    content_type: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
    time_zone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphLocation {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: Option<GraphEmailAddress>,
}

#[derive(Debug, Deserialize)]
struct GraphEmailAddress {
    address: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttendee {
    email_address: Option<GraphEmailAddress>,
    status: Option<GraphResponse>,
}

#[derive(Debug, Deserialize)]
struct GraphResponse {
    response: Option<String>,
}

impl ProviderAdapter for MicrosoftAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Microsoft
    }

    fn normalize(
        &self,
        native: &NativeEvent,
        connection: &CalendarConnection,
    ) -> Result<UnifiedCalendarEvent, NormalizationError> {
        let NativeEvent::Json(value) = native else {
            return Err(NormalizationError::UnsupportedPayload { provider: "microsoft" });
        };
        let event: GraphEvent = serde_json::from_value(value.clone())
            .map_err(|e| NormalizationError::Malformed(e.to_string()))?;

        let id = event.id.ok_or(NormalizationError::missing("id"))?;
        // Delta queries report deletions as `@removed` with no event body.
        let cancelled = event.is_cancelled || event.removed.is_some();
        let (start, end) = match (event.start, event.end) {
            (Some(start), Some(end)) => (start, end),
            _ if cancelled => return cancellation(id, connection),
            (None, _) => return Err(NormalizationError::missing("start")),
            (_, None) => return Err(NormalizationError::missing("end")),
        };
        let timezone = graph_timezone("start.timeZone", start.time_zone.as_deref())?;
        let end_timezone = graph_timezone("end.timeZone", end.time_zone.as_deref())?;

        let start = graph_time(
            "start",
            &start.date_time,
            timezone.unwrap_or(connection.timezone),
            event.is_all_day,
        )?;
        let end = graph_time(
            "end",
            &end.date_time,
            end_timezone.or(timezone).unwrap_or(connection.timezone),
            event.is_all_day,
        )?;

        let status = if cancelled {
            EventStatus::Cancelled
        } else if event.show_as.as_deref() == Some("tentative") {
            EventStatus::Tentative
        } else {
            EventStatus::Confirmed
        };

        let organizer = event
            .organizer
            .and_then(|o| o.email_address)
            .and_then(|e| e.address);
        let attendees = event
            .attendees
            .into_iter()
            .filter_map(|a| {
                let email = a.email_address?;
                let address = email.address?;
                let response = a.status.and_then(|s| s.response);
                let mut attendee = EventAttendee::new(address, response_status(response.as_deref()));
                attendee.display_name = email.name;
                attendee.organizer = response.as_deref() == Some("organizer")
                    || organizer
                        .as_deref()
                        .is_some_and(|o| o.eq_ignore_ascii_case(&attendee.email));
                Some(attendee)
            })
            .collect();

        // Prefer the plain-text body; HTML bodies fall back to the preview.
        let description = event
            .body
            .filter(|b| b.content_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("text")))
            .and_then(|b| b.content)
            .or(event.body_preview);

        EventParts {
            id,
            title: event.subject,
            description,
            location: event.location.and_then(|l| l.display_name),
            start,
            end,
            timezone,
            status,
            attendees,
        }
        .into_event(connection)
    }
}

/// Maps Graph's `responseType` vocabulary.
fn response_status(response: Option<&str>) -> AttendeeStatus {
    match response {
        Some("accepted") | Some("organizer") => AttendeeStatus::Accepted,
        Some("tentativelyAccepted") => AttendeeStatus::Tentative,
        Some("declined") => AttendeeStatus::Declined,
        // "none", "notResponded" and unknown values
        _ => AttendeeStatus::Pending,
    }
}

/// Windows zone names Graph commonly returns when no `Prefer` header is sent.
const WINDOWS_ZONES: &[(&str, &str)] = &[
    ("UTC", "UTC"),
    ("tzone://Microsoft/Utc", "UTC"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("Mountain Standard Time", "America/Denver"),
    ("Central Standard Time", "America/Chicago"),
    ("Eastern Standard Time", "America/New_York"),
    ("GMT Standard Time", "Europe/London"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Romance Standard Time", "Europe/Paris"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("India Standard Time", "Asia/Kolkata"),
    ("China Standard Time", "Asia/Shanghai"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
];

fn graph_timezone(field: &'static str, name: Option<&str>) -> Result<Option<Tz>, NormalizationError> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    let iana = WINDOWS_ZONES
        .iter()
        .find(|(windows, _)| *windows == name)
        .map_or(name, |(_, iana)| *iana);
    parse_timezone(iana)
        .map(Some)
        .map_err(|e| NormalizationError::invalid(field, e.to_string()))
}

fn graph_time(
    field: &'static str,
    raw: &str,
    tz: Tz,
    all_day: bool,
) -> Result<EventTime, NormalizationError> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| NormalizationError::invalid(field, format!("{raw:?}: {e}")))?;
    if all_day {
        return Ok(EventTime::from_date(naive.date()));
    }
    Ok(EventTime::from_local(resolve_local(tz, naive)))
}
