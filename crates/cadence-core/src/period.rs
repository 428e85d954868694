//! Calendar period bounds in a given timezone, and their display labels.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::recurrence::monday_of;
use crate::time::start_of_day;

/// Size of a calendar period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Day,
    /// ISO week, Monday to Sunday.
    Week,
    Month,
    Year,
}

impl Granularity {
    /// Returns the first local date of the period holding `date` and the first
    /// local date of the following period.
    fn period_dates(self, date: NaiveDate) -> (NaiveDate, NaiveDate) {
        let first = match self {
            Self::Day => date,
            Self::Week => monday_of(date),
            Self::Month => date.with_day(1).unwrap_or(date),
            Self::Year => date.with_ordinal(1).unwrap_or(date),
        };
        let next = match self {
            Self::Day => first.succ_opt(),
            Self::Week => first.checked_add_signed(Duration::days(7)),
            Self::Month => first.checked_add_months(Months::new(1)),
            Self::Year => first.checked_add_months(Months::new(12)),
        };
        (first, next.unwrap_or(NaiveDate::MAX))
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            "year" | "yearly" => Ok(Self::Year),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

/// The first and last instant of a calendar period, in the period's timezone.
///
/// `end` is the last millisecond of the period (23:59:59.999 local on its
/// last day). Use [`PeriodBounds::end_exclusive`] for half-open arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodBounds {
    pub granularity: Granularity,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl PeriodBounds {
    /// The instant the next period starts.
    pub fn end_exclusive(&self) -> DateTime<Tz> {
        self.end + Duration::milliseconds(1)
    }

    /// Returns true if `instant` falls within the period.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start.with_timezone(&Utc) && instant <= self.end.with_timezone(&Utc)
    }

    /// Local date of the first day.
    pub fn first_day(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Local date of the last day.
    pub fn last_day(&self) -> NaiveDate {
        self.end.date_naive()
    }
}

/// Returns the bounds of the `granularity` period containing `instant`, as
/// seen on a wall clock in `tz`.
pub fn bounds(instant: DateTime<Utc>, granularity: Granularity, tz: Tz) -> PeriodBounds {
    let local = instant.with_timezone(&tz).date_naive();
    let (first, next) = granularity.period_dates(local);
    let start = start_of_day(tz, first);
    let end = start_of_day(tz, next) - Duration::milliseconds(1);
    PeriodBounds {
        granularity,
        start,
        end,
    }
}

/// Renders `bounds` as a short label relative to `now`.
///
/// A single day spells out weekday and month ("Monday, January 1"); longer
/// ranges use abbreviated months ("Jan 1 - Jan 7"). Years are added only
/// when a bound falls outside the year of `now` in the bounds' timezone.
pub fn format_range(bounds: &PeriodBounds, now: DateTime<Utc>) -> String {
    let current_year = now.with_timezone(&bounds.start.timezone()).year();
    let first = bounds.first_day();
    let last = bounds.last_day();
    let same_year = first.year() == current_year && last.year() == current_year;

    if first == last {
        let label = first.format("%A, %B %-d");
        return if same_year {
            label.to_string()
        } else {
            format!("{label}, {}", first.year())
        };
    }

    if same_year {
        format!("{} - {}", first.format("%b %-d"), last.format("%b %-d"))
    } else {
        format!("{} - {}", first.format("%b %-d, %Y"), last.format("%b %-d, %Y"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Weekday};

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    mod bounds {
        use super::*;

        #[test]
        fn day_uses_given_timezone_not_utc() {
            // 00:30 UTC is still the previous evening in Los Angeles.
            let b = bounds(utc(2024, 3, 10, 0, 30), Granularity::Day, chrono_tz::America::Los_Angeles);
            assert_eq!(b.first_day(), date(2024, 3, 9));
            assert_eq!(b.start.with_timezone(&Utc), utc(2024, 3, 9, 8, 0));
            assert_eq!(b.last_day(), date(2024, 3, 9));
        }

        #[test]
        fn same_instant_is_today_in_utc() {
            let b = bounds(utc(2024, 3, 10, 0, 30), Granularity::Day, Tz::UTC);
            assert_eq!(b.first_day(), date(2024, 3, 10));
        }

        #[test]
        fn week_runs_monday_to_sunday() {
            let tz = chrono_tz::Europe::Berlin;
            let b = bounds(utc(2024, 1, 3, 12, 0), Granularity::Week, tz);
            assert_eq!(b.start.weekday(), Weekday::Mon);
            assert_eq!(b.first_day(), date(2024, 1, 1));
            assert_eq!((b.start.hour(), b.start.minute(), b.start.second()), (0, 0, 0));

            assert_eq!(b.end.weekday(), Weekday::Sun);
            assert_eq!(b.last_day(), date(2024, 1, 7));
            assert_eq!((b.end.hour(), b.end.minute(), b.end.second()), (23, 59, 59));
            assert_eq!(b.end.nanosecond(), 999_000_000);
        }

        #[test]
        fn week_on_sunday_belongs_to_previous_monday() {
            let b = bounds(utc(2024, 1, 7, 20, 0), Granularity::Week, Tz::UTC);
            assert_eq!(b.first_day(), date(2024, 1, 1));
        }

        #[test]
        fn week_across_dst_change_is_short() {
            let tz = chrono_tz::America::New_York;
            let b = bounds(utc(2024, 3, 8, 15, 0), Granularity::Week, tz);
            assert_eq!(b.start.with_timezone(&Utc), utc(2024, 3, 4, 5, 0));
            assert_eq!(b.end_exclusive().with_timezone(&Utc), utc(2024, 3, 11, 4, 0));
            assert_eq!(
                b.end_exclusive() - b.start,
                Duration::days(7) - Duration::hours(1)
            );
        }

        #[test]
        fn month_and_year() {
            let month = bounds(utc(2024, 2, 14, 9, 0), Granularity::Month, Tz::UTC);
            assert_eq!(month.first_day(), date(2024, 2, 1));
            assert_eq!(month.last_day(), date(2024, 2, 29));

            let year = bounds(utc(2024, 2, 14, 9, 0), Granularity::Year, Tz::UTC);
            assert_eq!(year.first_day(), date(2024, 1, 1));
            assert_eq!(year.end_exclusive().with_timezone(&Utc), utc(2025, 1, 1, 0, 0));
        }

        #[test]
        fn contains_is_inclusive_of_last_millisecond() {
            let b = bounds(utc(2024, 5, 1, 12, 0), Granularity::Day, Tz::UTC);
            assert!(b.contains(utc(2024, 5, 1, 0, 0)));
            assert!(b.contains(b.end.with_timezone(&Utc)));
            assert!(!b.contains(utc(2024, 5, 2, 0, 0)));
        }

        #[test]
        fn parse_granularity() {
            assert_eq!("Week".parse::<Granularity>(), Ok(Granularity::Week));
            assert_eq!("daily".parse::<Granularity>(), Ok(Granularity::Day));
            assert!("fortnight".parse::<Granularity>().is_err());
        }
    }

    mod format {
        use super::*;

        #[test]
        fn single_day_this_year() {
            let b = bounds(utc(2024, 1, 1, 10, 0), Granularity::Day, Tz::UTC);
            insta::assert_snapshot!(format_range(&b, utc(2024, 6, 1, 0, 0)), @"Monday, January 1");
        }

        #[test]
        fn single_day_other_year() {
            let b = bounds(utc(2023, 12, 31, 10, 0), Granularity::Day, Tz::UTC);
            insta::assert_snapshot!(format_range(&b, utc(2024, 6, 1, 0, 0)), @"Sunday, December 31, 2023");
        }

        #[test]
        fn week_this_year() {
            let b = bounds(utc(2024, 1, 3, 10, 0), Granularity::Week, Tz::UTC);
            insta::assert_snapshot!(format_range(&b, utc(2024, 1, 3, 10, 0)), @"Jan 1 - Jan 7");
        }

        #[test]
        fn week_spanning_new_year() {
            let b = bounds(utc(2025, 1, 1, 10, 0), Granularity::Week, Tz::UTC);
            insta::assert_snapshot!(format_range(&b, utc(2025, 1, 1, 10, 0)), @"Dec 30, 2024 - Jan 5, 2025");
        }

        #[test]
        fn reference_year_uses_bounds_timezone() {
            // 2024-12-31 22:00 UTC is already 2025 in Tokyo.
            let tz = chrono_tz::Asia::Tokyo;
            let b = bounds(utc(2025, 1, 10, 0, 0), Granularity::Month, tz);
            insta::assert_snapshot!(format_range(&b, utc(2024, 12, 31, 22, 0)), @"Jan 1 - Jan 31");
        }
    }
}
