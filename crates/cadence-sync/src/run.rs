//! Sync run audit records.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Final or in-progress state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    /// The provider fetch failed or the credential was invalid.
    Failed,
    /// Some native events were skipped, or the deadline cut the fetch short.
    Partial,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who started a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "actor", content = "id")]
pub enum Trigger {
    User(String),
    System,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Whether a run was requested interactively or by the background scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Active,
    #[default]
    Background,
}

/// Changes applied by a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub inserted: u32,
    pub updated: u32,
    pub deleted: u32,
}

impl SyncCounts {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Audit record of one reconciliation of one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: Uuid,
    pub connection_id: String,
    pub workspace_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub counts: SyncCounts,
    /// Native events skipped because they could not be normalized.
    #[serde(default)]
    pub error_count: u32,
    /// Set when the run deadline stopped the fetch.
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub triggered_by: Trigger,
    #[serde(default)]
    pub kind: RunKind,
}

impl SyncRun {
    /// A new run in the `running` state.
    pub fn start(
        connection_id: impl Into<String>,
        workspace_id: impl Into<String>,
        triggered_by: Trigger,
        kind: RunKind,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id: connection_id.into(),
            workspace_id: workspace_id.into(),
            started_at,
            finished_at: None,
            status: SyncStatus::Running,
            counts: SyncCounts::default(),
            error_count: 0,
            timed_out: false,
            error: None,
            triggered_by,
            kind,
        }
    }

    /// Closes the run. Status is derived from the error, timeout and skip counters.
    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
        self.status = if self.error.is_some() {
            SyncStatus::Failed
        } else if self.timed_out || self.error_count > 0 {
            SyncStatus::Partial
        } else {
            SyncStatus::Completed
        };
    }

    /// Closes the run as failed with `message`.
    pub fn fail(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.error = Some(message.into());
        self.finish(at);
    }

    /// Wall time between start and finish. `None` while running.
    pub fn duration(&self) -> Option<TimeDelta> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, s).unwrap()
    }

    fn run() -> SyncRun {
        SyncRun::start("conn-1", "ws-1", Trigger::System, RunKind::Background, utc(9, 0, 0))
    }

    #[test]
    fn finish_derives_status() {
        let mut clean = run();
        assert_eq!(clean.status, SyncStatus::Running);
        assert_eq!(clean.duration(), None);
        clean.finish(utc(9, 0, 12));
        assert_eq!(clean.status, SyncStatus::Completed);
        assert_eq!(clean.duration(), Some(TimeDelta::seconds(12)));

        let mut skipped = run();
        skipped.error_count = 2;
        skipped.finish(utc(9, 1, 0));
        assert_eq!(skipped.status, SyncStatus::Partial);

        let mut late = run();
        late.timed_out = true;
        late.finish(utc(9, 1, 0));
        assert_eq!(late.status, SyncStatus::Partial);

        let mut failed = run();
        failed.error_count = 1;
        failed.fail("credential expired", utc(9, 0, 1));
        assert_eq!(failed.status, SyncStatus::Failed);
        assert!(failed.status.is_finished());
    }

    #[test]
    fn serialized_shape() {
        let mut record = run();
        record.triggered_by = Trigger::User("u-7".into());
        record.kind = RunKind::Active;
        record.finish(utc(9, 0, 5));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["kind"], "active");
        assert_eq!(json["triggered_by"]["actor"], "user");
        assert_eq!(json["triggered_by"]["id"], "u-7");
        assert_eq!(json["counts"]["inserted"], 0);

        let back: SyncRun = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn trigger_display() {
        assert_eq!(Trigger::User("alice".into()).to_string(), "user:alice");
        assert_eq!(Trigger::System.to_string(), "system");
    }
}
