//! Habit streak command.

use std::sync::Arc;

use cadence_core::time::start_of_day;
use cadence_core::{Clock, FixedClock, Habit, RecurrenceRule, SystemClock};
use cadence_sync::{HabitReport, HabitTracker, MemoryStore, TrackerConfig};
use chrono::{NaiveDate, Utc};

use crate::commands::print_json;
use crate::error::CliResult;

/// Records `completed` against a throwaway habit following `rule` and
/// reports its streak as of `today` (the rule's local today when `None`).
///
/// A completed date that is not an occurrence of the rule is an error.
pub async fn report(
    rule: RecurrenceRule,
    completed: &[NaiveDate],
    today: Option<NaiveDate>,
    config: TrackerConfig,
) -> CliResult<HabitReport> {
    let clock: Arc<dyn Clock> = match today {
        Some(date) => Arc::new(FixedClock::new(start_of_day(rule.timezone, date).with_timezone(&Utc))),
        None => Arc::new(SystemClock),
    };
    let habit = Habit::new("cli", "local", "cli", rule, clock.now());
    let tracker = HabitTracker::new(Arc::new(MemoryStore::new()))
        .with_clock(clock)
        .with_config(config);

    for date in completed {
        tracker.complete(&habit, *date).await?;
    }
    Ok(tracker.report(&habit).await?)
}

pub async fn run(
    rule: RecurrenceRule,
    completed: &[NaiveDate],
    today: Option<NaiveDate>,
    config: TrackerConfig,
    json: bool,
) -> CliResult<()> {
    let report = report(rule, completed, today, config).await?;
    if json {
        return print_json(&report);
    }

    let streak = &report.streak;
    println!("as of {}", report.today);
    println!("current streak: {}", streak.current);
    println!("longest streak: {}", streak.longest);
    println!(
        "completed: {}/{} ({}%)",
        streak.total_completions, streak.total_occurrences, streak.completion_rate
    );
    if let Some(last) = streak.last_completed {
        println!("last completed: {last}");
    }
    println!("trend:");
    for bucket in &report.trend {
        let bar = "#".repeat(bucket.completed as usize);
        println!("  {}  {}/{}  {bar}", bucket.start, bucket.completed, bucket.total);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_sync::SyncError;
    use chrono::Weekday;

    use crate::error::CliError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn streak_as_of_given_day() {
        let rule = RecurrenceRule::weekly(date(2024, 1, 1), [Weekday::Mon, Weekday::Thu]);
        let completed = [
            date(2024, 1, 1),
            date(2024, 1, 4),
            date(2024, 1, 11),
            date(2024, 1, 15),
            date(2024, 1, 18),
            date(2024, 1, 22),
        ];

        let report = report(rule, &completed, Some(date(2024, 1, 24)), TrackerConfig::default())
            .await
            .unwrap();
        assert_eq!(report.today, date(2024, 1, 24));
        assert_eq!(report.streak.current, 4);
        assert_eq!(report.streak.longest, 4);
        assert_eq!(report.streak.total_occurrences, 7);
        assert_eq!(report.trend.len(), 8);
    }

    #[tokio::test]
    async fn today_is_local_to_the_rule() {
        let rule = RecurrenceRule::daily(date(2024, 1, 1)).with_timezone(chrono_tz::Pacific::Auckland);
        let report = report(rule, &[date(2024, 1, 3)], Some(date(2024, 1, 3)), TrackerConfig::default())
            .await
            .unwrap();
        assert_eq!(report.today, date(2024, 1, 3));
        assert_eq!(report.streak.current, 1);
    }

    #[tokio::test]
    async fn off_schedule_completion_is_rejected() {
        let rule = RecurrenceRule::weekly(date(2024, 1, 1), [Weekday::Mon]);
        let err = report(rule, &[date(2024, 1, 2)], Some(date(2024, 1, 10)), TrackerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Sync(SyncError::NotAnOccurrence { .. })));
    }
}
