//! Sync engine configuration.

use std::time::Duration;

use cadence_core::{MAX_TREND_WEEKS, TimeWindow};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How far back from now events are fetched and reconciled.
    #[serde(with = "secs")]
    pub past_window: Duration,
    /// How far ahead of now events are fetched and reconciled.
    #[serde(with = "secs")]
    pub future_window: Duration,
    /// Deadline for one run. When reached, fetching stops and the run ends partial.
    #[serde(with = "secs")]
    pub run_deadline: Duration,
    pub page_size: usize,
    /// Upper bound on connections reconciled at the same time.
    pub max_concurrent_runs: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            past_window: Duration::from_secs(7 * 24 * 3600),
            future_window: Duration::from_secs(90 * 24 * 3600),
            run_deadline: Duration::from_secs(120),
            page_size: 250,
            max_concurrent_runs: 4,
        }
    }
}

impl SyncConfig {
    pub fn with_windows(mut self, past: Duration, future: Duration) -> Self {
        self.past_window = past;
        self.future_window = future;
        self
    }

    pub fn with_run_deadline(mut self, deadline: Duration) -> Self {
        self.run_deadline = deadline;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_max_concurrent_runs(mut self, max: usize) -> Self {
        self.max_concurrent_runs = max.max(1);
        self
    }

    /// The fetch window of a run starting at `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::around(now, clamp(self.past_window), clamp(self.future_window))
    }
}

// Far beyond any sensible window, and safe to add to any calendar date.
fn clamp(span: Duration) -> TimeDelta {
    TimeDelta::from_std(span)
        .unwrap_or(TimeDelta::MAX)
        .min(TimeDelta::days(365 * 100))
}

/// Habit tracker settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Weeks covered by the trend of a habit report, at most [`MAX_TREND_WEEKS`].
    pub trend_weeks: u32,
    /// Maximum number of cached expansions.
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            trend_weeks: 8,
            cache_capacity: 256,
            cache_ttl: Duration::from_secs(600),
        }
    }
}

impl TrackerConfig {
    pub fn with_trend_weeks(mut self, weeks: u32) -> Self {
        self.trend_weeks = weeks.min(MAX_TREND_WEEKS);
        self
    }

    pub fn with_cache(mut self, capacity: usize, ttl: Duration) -> Self {
        self.cache_capacity = capacity;
        self.cache_ttl = ttl;
        self
    }
}

/// Durations as whole seconds in config files.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
