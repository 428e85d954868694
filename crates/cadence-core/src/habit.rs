//! Habits and their completion records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::recurrence::RecurrenceRule;

/// A recurring habit owned by a workspace.
///
/// Editing the rule never rewrites past completions; streaks are always
/// recomputed from stored completions against the current rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub rule: RecurrenceRule,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Habit {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        name: impl Into<String>,
        rule: RecurrenceRule,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            name: name.into(),
            rule,
            created_at,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Replaces the rule. Existing completions are left untouched.
    pub fn set_rule(&mut self, rule: RecurrenceRule) {
        self.rule = rule;
    }

    /// Tombstones the habit, keeping its completions valid.
    pub fn soft_delete(&mut self, at: DateTime<Utc>) {
        self.deleted_at.get_or_insert(at);
    }
}

/// A habit marked done for one occurrence. Unique per `(habit_id, occurrence_date)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub habit_id: String,
    pub occurrence_date: NaiveDate,
    pub completed_at: DateTime<Utc>,
}

impl Completion {
    pub fn new(habit_id: impl Into<String>, occurrence_date: NaiveDate, completed_at: DateTime<Utc>) -> Self {
        Self {
            habit_id: habit_id.into(),
            occurrence_date,
            completed_at,
        }
    }
}
