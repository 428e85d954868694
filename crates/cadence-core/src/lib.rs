//! Core types and pure computations: recurrence, streaks, period bounds, events

pub mod event;
pub mod habit;
pub mod period;
pub mod recurrence;
pub mod streak;
pub mod time;
pub mod tracing;

pub use event::{
    Attendee, AttendeeStatus, EventAttendee, EventStatus, NaturalKey, ScheduledEvent,
    UnifiedCalendarEvent,
};
pub use habit::{Completion, Habit};
pub use period::{Granularity, PeriodBounds, bounds, format_range};
pub use recurrence::{Frequency, InvalidRuleError, RecurrenceRule, expand};
pub use streak::{MAX_TREND_WEEKS, StreakSummary, TrendBucket, compute_streak, weekly_trend};
pub use time::{
    Clock, EventTime, FixedClock, SystemClock, TimeWindow, TimezoneError, parse_timezone,
};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
