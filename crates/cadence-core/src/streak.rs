//! Completion streaks and weekly trend buckets.
//!
//! Both functions take the occurrences of a habit (as produced by
//! [`crate::recurrence::expand`]) and the set of dates that carry a
//! completion. Completions on dates that are not occurrences are ignored.

use std::collections::HashSet;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// Streak figures for one habit as of a given day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSummary {
    /// Consecutive completed occurrences ending at the latest occurrence on or
    /// before today. Zero when that occurrence is not completed.
    pub current: u32,
    /// Longest run of consecutive completed occurrences in the history.
    pub longest: u32,
    /// Occurrences on or before today.
    pub total_occurrences: u32,
    /// Occurrences on or before today that are completed.
    pub total_completions: u32,
    /// `total_completions` as a whole percentage of `total_occurrences`.
    pub completion_rate: u8,
    /// The most recent completed occurrence.
    pub last_completed: Option<NaiveDate>,
}

/// Completed and expected occurrences for one week of a trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendBucket {
    /// First day of the bucket.
    pub start: NaiveDate,
    pub completed: u32,
    pub total: u32,
}

/// Computes the streak summary of `occurrences` as of `today`.
///
/// `occurrences` must be ascending, which is what expansion returns.
/// Occurrences after `today` are not counted.
pub fn compute_streak(
    occurrences: &[NaiveDate],
    completed: &HashSet<NaiveDate>,
    today: NaiveDate,
) -> StreakSummary {
    let past = occurrences.partition_point(|date| *date <= today);
    let past = &occurrences[..past];

    let mut summary = StreakSummary {
        total_occurrences: past.len() as u32,
        ..StreakSummary::default()
    };

    let mut run = 0u32;
    for date in past {
        if completed.contains(date) {
            run += 1;
            summary.total_completions += 1;
            summary.last_completed = Some(*date);
            summary.longest = summary.longest.max(run);
        } else {
            run = 0;
        }
    }
    // The walk ends at the latest past occurrence, so the open run is the
    // current streak.
    summary.current = run;
    summary.completion_rate = percent(summary.total_completions, summary.total_occurrences);
    summary
}

/// Longest trend [`weekly_trend`] builds: ten years of weeks.
pub const MAX_TREND_WEEKS: u32 = 520;

/// Splits the `weeks` weeks ending on `today` (inclusive) into 7-day buckets,
/// oldest first, and counts occurrences and completions in each.
///
/// A week without occurrences reports `{0, 0}`. `weeks` is capped at
/// [`MAX_TREND_WEEKS`].
pub fn weekly_trend(
    occurrences: &[NaiveDate],
    completed: &HashSet<NaiveDate>,
    today: NaiveDate,
    weeks: u32,
) -> Vec<TrendBucket> {
    let weeks = weeks.min(MAX_TREND_WEEKS);
    let Some(window_start) = today
        .succ_opt()
        .and_then(|end| end.checked_sub_days(Days::new(u64::from(weeks) * 7)))
    else {
        return Vec::new();
    };

    let mut buckets: Vec<TrendBucket> = (0..weeks)
        .filter_map(|week| {
            window_start
                .checked_add_days(Days::new(u64::from(week) * 7))
                .map(|start| TrendBucket {
                    start,
                    completed: 0,
                    total: 0,
                })
        })
        .collect();

    for date in occurrences
        .iter()
        .filter(|date| **date >= window_start && **date <= today)
    {
        let index = ((*date - window_start).num_days() / 7) as usize;
        if let Some(bucket) = buckets.get_mut(index) {
            bucket.total += 1;
            if completed.contains(date) {
                bucket.completed += 1;
            }
        }
    }

    buckets
}

fn percent(part: u32, whole: u32) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((u64::from(part) * 100 + u64::from(whole) / 2) / u64::from(whole)) as u8
}
