//! Time primitives shared by every component.
//!
//! This module provides:
//! - [`Clock`]: an injectable "now" source, with [`SystemClock`] and [`FixedClock`]
//! - [`EventTime`]: a provider event time (either an instant or an all-day date)
//! - [`TimeWindow`]: a half-open `[start, end)` query range in UTC
//! - timezone helpers that resolve local wall-clock times across DST transitions

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

/// A source of the current instant.
///
/// Every "today" or "now" comparison goes through a clock so that tests can
/// pin time across timezone and DST edges.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current local date in the given timezone.
    fn today_in(&self, tz: Tz) -> NaiveDate {
        self.now().with_timezone(&tz).date_naive()
    }
}

/// The process clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    /// Creates a clock that always reports `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// Error returned for an unknown timezone identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown timezone: {name}")]
pub struct TimezoneError {
    /// The identifier that failed to parse.
    pub name: String,
}

/// Parses an IANA timezone identifier such as `America/New_York`.
pub fn parse_timezone(name: &str) -> Result<Tz, TimezoneError> {
    name.trim().parse::<Tz>().map_err(|_| TimezoneError {
        name: name.to_string(),
    })
}

/// Resolves a local wall-clock time to an instant in `tz`.
///
/// Ambiguous times (clocks going back) resolve to the earlier instant.
/// Times inside a gap (clocks going forward) resolve to the first valid
/// instant after the gap.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            // Gaps are at most a few hours; walk forward minute by minute
            // until the wall clock exists again.
            let mut candidate = local;
            loop {
                candidate += Duration::minutes(1);
                match tz.from_local_datetime(&candidate) {
                    LocalResult::Single(dt) => return dt,
                    LocalResult::Ambiguous(earliest, _) => return earliest,
                    LocalResult::None => continue,
                }
            }
        }
    }
}

/// Returns the instant of local midnight starting `date` in `tz`.
pub fn start_of_day(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    resolve_local(tz, date.and_time(chrono::NaiveTime::MIN))
}

/// Represents the time of a calendar event as reported by a provider.
///
/// Calendar events can have two types of times:
/// - **DateTime**: A specific point in time (stored as UTC)
/// - **AllDay**: A date without a specific time (all-day events)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum EventTime {
    /// A specific datetime, stored in UTC.
    DateTime(DateTime<Utc>),
    /// An all-day event date (no specific time).
    AllDay(NaiveDate),
}

impl EventTime {
    /// Creates a new `EventTime::DateTime` from a UTC datetime.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }

    /// Creates a new `EventTime::DateTime` from a datetime in any timezone.
    pub fn from_local<Z: TimeZone>(dt: DateTime<Z>) -> Self {
        Self::DateTime(dt.with_timezone(&Utc))
    }

    /// Creates a new `EventTime::AllDay` from a date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::AllDay(date)
    }

    /// Returns `true` if this is an all-day event time.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::AllDay(_))
    }

    /// Resolves this time to an instant.
    ///
    /// All-day dates start at local midnight in `tz`, so an all-day event
    /// stays on its calendar day for viewers in the event's own timezone.
    pub fn to_instant(&self, tz: Tz) -> DateTime<Utc> {
        match self {
            Self::DateTime(dt) => *dt,
            Self::AllDay(date) => start_of_day(tz, *date).with_timezone(&Utc),
        }
    }

    /// Returns the date portion of this event time in `tz`.
    pub fn date_in(&self, tz: Tz) -> NaiveDate {
        match self {
            Self::DateTime(dt) => dt.with_timezone(&tz).date_naive(),
            Self::AllDay(date) => *date,
        }
    }
}

impl PartialOrd for EventTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_instant(Tz::UTC).cmp(&other.to_instant(Tz::UTC))
    }
}

/// A time window for querying calendar events.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }

    /// Creates a window reaching `past` before and `future` after `now`.
    pub fn around(now: DateTime<Utc>, past: Duration, future: Duration) -> Self {
        Self::new(now - past, now + future)
    }

    /// Returns the duration of this time window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Checks if a datetime falls within this window.
    ///
    /// Uses half-open interval semantics: `[start, end)`.
    pub fn contains(&self, dt: DateTime<Utc>) -> bool {
        self.start <= dt && dt < self.end
    }

    /// Checks if an interval `[start, end)` overlaps with this window.
    ///
    /// Zero-length intervals overlap when their instant lies inside the window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if start == end {
            return self.contains(start);
        }
        start < self.end && end > self.start
    }
}
