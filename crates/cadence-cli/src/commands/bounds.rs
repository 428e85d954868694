//! Period bounds command.

use cadence_core::{Granularity, PeriodBounds, bounds, format_range};
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::commands::print_json;
use crate::error::CliResult;

/// A period together with its display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescribedPeriod {
    #[serde(flatten)]
    pub bounds: PeriodBounds,
    pub label: String,
    pub timezone: Tz,
}

/// Computes the `granularity` period holding `at` in `tz`, labelled relative to `now`.
pub fn describe(granularity: Granularity, at: DateTime<Utc>, tz: Tz, now: DateTime<Utc>) -> DescribedPeriod {
    let bounds = bounds(at, granularity, tz);
    DescribedPeriod {
        label: format_range(&bounds, now),
        bounds,
        timezone: tz,
    }
}

pub fn run(granularity: Granularity, at: Option<DateTime<Utc>>, tz: Tz, json: bool) -> CliResult<()> {
    let now = Utc::now();
    let period = describe(granularity, at.unwrap_or(now), tz, now);
    if json {
        return print_json(&period);
    }
    println!("{}", period.label);
    println!(
        "start: {}",
        period.bounds.start.to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    println!(
        "end:   {}",
        period.bounds.end.to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn week_in_los_angeles() {
        let tz = chrono_tz::America::Los_Angeles;
        // Still Saturday evening locally.
        let period = describe(Granularity::Week, utc(2024, 3, 10, 0, 30), tz, utc(2024, 3, 10, 0, 30));
        assert_eq!(period.label, "Mar 4 - Mar 10");
        assert_eq!(
            period.bounds.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            "2024-03-04T00:00:00.000-08:00"
        );
        // DST starts on the 10th.
        assert_eq!(
            period.bounds.end.to_rfc3339_opts(SecondsFormat::Millis, true),
            "2024-03-10T23:59:59.999-07:00"
        );
    }

    #[test]
    fn json_shape() {
        let period = describe(Granularity::Day, utc(2024, 1, 1, 10, 0), Tz::UTC, utc(2024, 6, 1, 0, 0));
        let value = serde_json::to_value(&period).unwrap();
        assert_eq!(value["granularity"], "day");
        assert_eq!(value["label"], "Monday, January 1");
        assert_eq!(value["timezone"], "UTC");
        assert!(value["start"].as_str().unwrap().starts_with("2024-01-01T00:00:00"));
    }
}
