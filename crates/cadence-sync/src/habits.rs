//! Habit completions and reports.
//!
//! Streaks are never stored. Every report expands the habit's current rule
//! over its whole history and checks it against the stored completions, so a
//! rule edit changes the streak without touching any completion.

use std::collections::HashSet;
use std::sync::Arc;

use cadence_core::{
    Clock, Completion, Habit, StreakSummary, SystemClock, TrendBucket, compute_streak,
    weekly_trend,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::OccurrenceCache;
use crate::config::TrackerConfig;
use crate::error::{SyncError, SyncResult};
use crate::store::{CompletionStore, UpsertOutcome};

/// Streak and trend of one habit as of `today`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HabitReport {
    pub habit_id: String,
    /// Today in the rule's timezone.
    pub today: NaiveDate,
    pub streak: StreakSummary,
    /// Oldest week first.
    pub trend: Vec<TrendBucket>,
    /// When the most recent completed occurrence was marked done.
    pub last_completed_at: Option<DateTime<Utc>>,
}

/// Records completions and derives streak reports.
pub struct HabitTracker {
    completions: Arc<dyn CompletionStore>,
    clock: Arc<dyn Clock>,
    cache: Mutex<OccurrenceCache>,
    config: TrackerConfig,
}

impl HabitTracker {
    pub fn new(completions: Arc<dyn CompletionStore>) -> Self {
        let config = TrackerConfig::default();
        Self {
            completions,
            clock: Arc::new(SystemClock),
            cache: Mutex::new(OccurrenceCache::new(config.cache_ttl, config.cache_capacity)),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.cache = Mutex::new(OccurrenceCache::new(config.cache_ttl, config.cache_capacity));
        self.config = config;
        self
    }

    /// Marks `date` done for `habit`. Completing the same date again updates
    /// the completion instant.
    ///
    /// # Errors
    ///
    /// Fails for a soft-deleted habit, an invalid rule, or a date that is not
    /// an occurrence of the current rule.
    pub async fn complete(&self, habit: &Habit, date: NaiveDate) -> SyncResult<UpsertOutcome> {
        if habit.is_deleted() {
            return Err(SyncError::HabitDeleted {
                habit_id: habit.id.clone(),
            });
        }
        if !habit.rule.is_occurrence(date)? {
            return Err(SyncError::NotAnOccurrence {
                habit_id: habit.id.clone(),
                date,
            });
        }

        let completion = Completion::new(&habit.id, date, self.clock.now());
        let outcome = self.completions.record_completion(completion).await?;
        debug!(habit_id = %habit.id, %date, ?outcome, "Recorded completion");
        Ok(outcome)
    }

    /// Computes the streak summary and weekly trend of `habit`.
    ///
    /// Soft-deleted habits still report; their completions stay valid.
    pub async fn report(&self, habit: &Habit) -> SyncResult<HabitReport> {
        habit.rule.validate()?;
        let today = self.clock.today_in(habit.rule.timezone);
        let until = today.succ_opt().unwrap_or(today);

        let occurrences: Arc<[NaiveDate]> = if habit.rule.start < until {
            self.cache
                .lock()
                .await
                .get_or_expand(&habit.rule, habit.rule.start, until)?
        } else {
            Arc::from(Vec::new())
        };

        let completions = self.completions.completions_for(&habit.id).await?;
        let completed: HashSet<NaiveDate> =
            completions.iter().map(|c| c.occurrence_date).collect();

        let streak = compute_streak(&occurrences, &completed, today);
        let trend = weekly_trend(&occurrences, &completed, today, self.config.trend_weeks);
        let last_completed_at = streak.last_completed.and_then(|day| {
            completions
                .iter()
                .find(|c| c.occurrence_date == day)
                .map(|c| c.completed_at)
        });

        Ok(HabitReport {
            habit_id: habit.id.clone(),
            today,
            streak,
            trend,
            last_completed_at,
        })
    }
}
