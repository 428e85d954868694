//! CalDAV adapter.
//!
//! Normalizes the first `VEVENT` of an iCalendar resource as returned by a
//! `calendar-query` REPORT. Times may be UTC, floating, `TZID`-qualified or
//! `VALUE=DATE`.

use cadence_core::{
    AttendeeStatus, EventAttendee, EventStatus, EventTime, UnifiedCalendarEvent, parse_timezone,
    time::resolve_local,
};
use chrono_tz::Tz;
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::adapter::ProviderAdapter;
use crate::connection::{CalendarConnection, ProviderKind};
use crate::error::NormalizationError;
use crate::native::NativeEvent;
use crate::normalize::{EventParts, cancellation};

/// Adapter for iCalendar events fetched over CalDAV.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalDavAdapter;

impl ProviderAdapter for CalDavAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::CalDav
    }

    fn normalize(
        &self,
        native: &NativeEvent,
        connection: &CalendarConnection,
    ) -> Result<UnifiedCalendarEvent, NormalizationError> {
        let NativeEvent::Ical(text) = native else {
            return Err(NormalizationError::UnsupportedPayload { provider: "caldav" });
        };

        let unfolded = unfold(text);
        let calendar = read_calendar(&unfolded).map_err(NormalizationError::Malformed)?;
        let vevent = calendar
            .components
            .iter()
            .find(|c| c.name == "VEVENT")
            .ok_or(NormalizationError::missing("VEVENT"))?;

        let id = text_prop(vevent, "UID").ok_or(NormalizationError::missing("UID"))?;
        let status = match vevent.find_prop("STATUS").map(|p| p.val.as_ref()) {
            Some("CANCELLED") => EventStatus::Cancelled,
            Some("TENTATIVE") => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        };
        let Some(dtstart) = vevent.find_prop("DTSTART") else {
            if status == EventStatus::Cancelled {
                return cancellation(id, connection);
            }
            return Err(NormalizationError::missing("DTSTART"));
        };
        let (start, timezone) = ical_time("DTSTART", dtstart, connection.timezone)?;
        let end = match vevent.find_prop("DTEND") {
            Some(dtend) => ical_time("DTEND", dtend, connection.timezone)?.0,
            None => default_end(&start),
        };

        let organizer = vevent.find_prop("ORGANIZER").map(|p| mailto(p.val.as_ref()));
        let attendees = vevent
            .properties
            .iter()
            .filter(|p| p.name == "ATTENDEE")
            .map(|p| {
                let mut attendee = EventAttendee::new(
                    mailto(p.val.as_ref()),
                    partstat(param(p, "PARTSTAT").as_deref()),
                );
                attendee.display_name = param(p, "CN");
                attendee.organizer = organizer
                    .as_deref()
                    .is_some_and(|o| o.eq_ignore_ascii_case(&attendee.email));
                attendee
            })
            .collect();

        EventParts {
            id,
            title: text_prop(vevent, "SUMMARY"),
            description: text_prop(vevent, "DESCRIPTION"),
            location: text_prop(vevent, "LOCATION"),
            start,
            end,
            timezone,
            status,
            attendees,
        }
        .into_event(connection)
    }
}

/// Maps RFC 5545 `PARTSTAT` values.
fn partstat(value: Option<&str>) -> AttendeeStatus {
    match value.map(str::to_ascii_uppercase).as_deref() {
        Some("ACCEPTED") => AttendeeStatus::Accepted,
        Some("DECLINED") => AttendeeStatus::Declined,
        Some("TENTATIVE") => AttendeeStatus::Tentative,
        // NEEDS-ACTION, DELEGATED, x-name and iana-token values
        _ => AttendeeStatus::Pending,
    }
}

fn text_prop(component: &Component<'_>, name: &str) -> Option<String> {
    component.find_prop(name).map(|p| unescape(p.val.as_ref()))
}

fn param(prop: &Property<'_>, key: &str) -> Option<String> {
    prop.params
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()))
}

fn mailto(value: &str) -> String {
    let trimmed = value.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("mailto:") => trimmed[7..].to_string(),
        _ => trimmed.to_string(),
    }
}

/// Reverses RFC 5545 TEXT escaping.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Reads a date or date-time property. Returns the zone named by `TZID`, if any.
fn ical_time(
    field: &'static str,
    prop: &Property<'_>,
    fallback: Tz,
) -> Result<(EventTime, Option<Tz>), NormalizationError> {
    let value = DatePerhapsTime::try_from(prop)
        .map_err(|_| NormalizationError::invalid(field, prop.val.to_string()))?;
    match value {
        DatePerhapsTime::Date(date) => Ok((EventTime::from_date(date), None)),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => Ok((EventTime::from_utc(dt), None)),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => {
            Ok((EventTime::from_local(resolve_local(fallback, naive)), None))
        }
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            // Some servers prefix globally unique ids with a slash.
            let tz = parse_timezone(tzid.trim_start_matches('/'))
                .map_err(|e| NormalizationError::invalid(field, e.to_string()))?;
            Ok((EventTime::from_local(resolve_local(tz, date_time)), Some(tz)))
        }
    }
}

/// RFC 5545: without DTEND, a date event lasts one day and a date-time
/// event ends when it starts.
fn default_end(start: &EventTime) -> EventTime {
    match start {
        EventTime::AllDay(date) => EventTime::from_date(date.succ_opt().unwrap_or(*date)),
        EventTime::DateTime(_) => start.clone(),
    }
}
