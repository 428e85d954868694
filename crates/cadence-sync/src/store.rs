//! Persistence collaborator traits and an in-memory implementation.
//!
//! The engine never talks to a database directly. It needs four guarantees
//! from whatever backs these traits:
//!
//! - upserts of [`UnifiedCalendarEvent`] are atomic per natural key, so two
//!   overlapping runs for the same connection cannot duplicate an event;
//! - completions are unique per `(habit id, occurrence date)`;
//! - the attendee update is one conditional write that reports how many rows
//!   it touched;
//! - every read path filters tombstoned rows.
//!
//! [`MemoryStore`] provides all four behind a single `tokio` lock and can be
//! snapshotted to JSON, which is what the CLI persists between runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use cadence_core::{Attendee, AttendeeStatus, Completion, NaturalKey, ScheduledEvent, UnifiedCalendarEvent};
use cadence_providers::{BoxFuture, CalendarConnection};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::StoreError;
use crate::run::SyncRun;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// What an upsert did to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// New row, or a tombstoned row revived.
    Inserted,
    Updated,
    /// Content fingerprint unchanged; nothing written.
    Unchanged,
}

/// Unified events keyed by natural key.
pub trait EventStore: Send + Sync {
    /// Live (non-tombstoned) events fetched through `connection_id`.
    fn load_events<'a>(
        &'a self,
        connection_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<UnifiedCalendarEvent>>>;

    /// Inserts or updates `event` atomically by its natural key.
    ///
    /// A live row keeps the connection that first stored it, so two
    /// connections to the same calendar never take the row from each other.
    /// A tombstoned row goes to whichever connection revives it.
    fn upsert_event(&self, event: UnifiedCalendarEvent) -> BoxFuture<'_, StoreResult<UpsertOutcome>>;

    /// Tombstones the event. Returns false if it was missing or already tombstoned.
    fn soft_delete_event<'a>(
        &'a self,
        key: &'a NaturalKey,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<bool>>;
}

/// Audit trail of reconciliation runs.
pub trait SyncRunStore: Send + Sync {
    /// Inserts or replaces the run with the same id.
    fn record_run<'a>(&'a self, run: &'a SyncRun) -> BoxFuture<'a, StoreResult<()>>;

    /// Runs of a connection, oldest first.
    fn runs_for<'a>(&'a self, connection_id: &'a str) -> BoxFuture<'a, StoreResult<Vec<SyncRun>>>;
}

/// Habit completions, unique per `(habit id, occurrence date)`.
pub trait CompletionStore: Send + Sync {
    /// Inserts the completion, or updates `completed_at` when one exists for
    /// the same date. Never returns [`UpsertOutcome::Unchanged`].
    fn record_completion(&self, completion: Completion) -> BoxFuture<'_, StoreResult<UpsertOutcome>>;

    fn completions_for<'a>(&'a self, habit_id: &'a str) -> BoxFuture<'a, StoreResult<Vec<Completion>>>;
}

/// A conditional attendee status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendeeUpdate {
    pub event_id: String,
    pub user_id: String,
    pub status: AttendeeStatus,
    pub responded_at: DateTime<Utc>,
    /// When set, the row must still be at this version.
    pub expected_version: Option<u64>,
}

/// Outcome of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub rows_affected: u64,
    /// The row after the update, when one was affected.
    pub row: Option<Attendee>,
}

/// Read-only view used to explain a zero-row update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attendance {
    /// The event does not exist or is tombstoned.
    EventMissing,
    /// The event exists but has no row for the user.
    NotInvited,
    Present(Attendee),
}

/// Attendee rows of scheduled events.
pub trait AttendeeStore: Send + Sync {
    /// Applies `update` if the row exists, its event is live, and the version
    /// matches. One statement; no prior read.
    fn update_attendee_status(&self, update: AttendeeUpdate) -> BoxFuture<'_, StoreResult<UpdateResult>>;

    fn attendance<'a>(
        &'a self,
        event_id: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Attendance>>;
}

/// Calendar connections known to the engine.
pub trait ConnectionStore: Send + Sync {
    fn active_connections(&self) -> BoxFuture<'_, StoreResult<Vec<CalendarConnection>>>;
}

/// Serializable contents of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub connections: Vec<CalendarConnection>,
    pub events: Vec<UnifiedCalendarEvent>,
    pub runs: Vec<SyncRun>,
    pub completions: Vec<Completion>,
    pub scheduled_events: Vec<ScheduledEvent>,
    pub attendees: Vec<Attendee>,
}

#[derive(Debug, Default)]
struct MemoryState {
    connections: BTreeMap<String, CalendarConnection>,
    events: BTreeMap<NaturalKey, UnifiedCalendarEvent>,
    runs: Vec<SyncRun>,
    run_index: HashMap<Uuid, usize>,
    completions: BTreeMap<(String, NaiveDate), Completion>,
    scheduled_events: HashMap<String, ScheduledEvent>,
    attendees: HashMap<(String, String), Attendee>,
}

/// In-memory store implementing every persistence trait.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut state = MemoryState::default();
        for connection in snapshot.connections {
            state.connections.insert(connection.id.clone(), connection);
        }
        for event in snapshot.events {
            state.events.insert(event.key.clone(), event);
        }
        for run in snapshot.runs {
            state.run_index.insert(run.id, state.runs.len());
            state.runs.push(run);
        }
        for completion in snapshot.completions {
            state
                .completions
                .insert((completion.habit_id.clone(), completion.occurrence_date), completion);
        }
        for event in snapshot.scheduled_events {
            state.scheduled_events.insert(event.id.clone(), event);
        }
        for attendee in snapshot.attendees {
            state
                .attendees
                .insert((attendee.event_id.clone(), attendee.user_id.clone()), attendee);
        }
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Copies the whole store, tombstones included.
    pub async fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.read().await;
        let mut scheduled_events: Vec<_> = state.scheduled_events.values().cloned().collect();
        scheduled_events.sort_by(|a, b| a.id.cmp(&b.id));
        let mut attendees: Vec<_> = state.attendees.values().cloned().collect();
        attendees.sort_by(|a, b| (&a.event_id, &a.user_id).cmp(&(&b.event_id, &b.user_id)));

        StoreSnapshot {
            connections: state.connections.values().cloned().collect(),
            events: state.events.values().cloned().collect(),
            runs: state.runs.clone(),
            completions: state.completions.values().cloned().collect(),
            scheduled_events,
            attendees,
        }
    }

    pub async fn add_connection(&self, connection: CalendarConnection) {
        self.state
            .write()
            .await
            .connections
            .insert(connection.id.clone(), connection);
    }

    pub async fn add_scheduled_event(&self, event: ScheduledEvent) {
        self.state
            .write()
            .await
            .scheduled_events
            .insert(event.id.clone(), event);
    }

    /// Tombstones a scheduled event. Its attendee rows stay.
    pub async fn delete_scheduled_event(&self, event_id: &str, at: DateTime<Utc>) {
        if let Some(event) = self.state.write().await.scheduled_events.get_mut(event_id) {
            event.deleted_at.get_or_insert(at);
        }
    }

    pub async fn add_attendee(&self, attendee: Attendee) {
        self.state
            .write()
            .await
            .attendees
            .insert((attendee.event_id.clone(), attendee.user_id.clone()), attendee);
    }

    /// Looks up a stored event, tombstoned or not.
    pub async fn event(&self, key: &NaturalKey) -> Option<UnifiedCalendarEvent> {
        self.state.read().await.events.get(key).cloned()
    }
}

impl EventStore for MemoryStore {
    fn load_events<'a>(
        &'a self,
        connection_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Vec<UnifiedCalendarEvent>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .events
                .values()
                .filter(|event| event.connection_id == connection_id && !event.is_deleted())
                .cloned()
                .collect())
        })
    }

    fn upsert_event(&self, event: UnifiedCalendarEvent) -> BoxFuture<'_, StoreResult<UpsertOutcome>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let outcome = match state.events.get(&event.key) {
                None => UpsertOutcome::Inserted,
                Some(stored) if stored.is_deleted() => UpsertOutcome::Inserted,
                Some(stored) if stored.fingerprint() == event.fingerprint() => {
                    UpsertOutcome::Unchanged
                }
                Some(_) => UpsertOutcome::Updated,
            };
            trace!(key = %event.key, ?outcome, "upsert event");
            if outcome != UpsertOutcome::Unchanged {
                let mut event = event;
                if let Some(stored) = state.events.get(&event.key).filter(|s| !s.is_deleted()) {
                    event.connection_id.clone_from(&stored.connection_id);
                }
                event.deleted_at = None;
                state.events.insert(event.key.clone(), event);
            }
            Ok(outcome)
        })
    }

    fn soft_delete_event<'a>(
        &'a self,
        key: &'a NaturalKey,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, StoreResult<bool>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            match state.events.get_mut(key) {
                Some(event) if !event.is_deleted() => {
                    event.deleted_at = Some(at);
                    Ok(true)
                }
                _ => Ok(false),
            }
        })
    }
}

impl SyncRunStore for MemoryStore {
    fn record_run<'a>(&'a self, run: &'a SyncRun) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            match state.run_index.get(&run.id).copied() {
                Some(index) => state.runs[index] = run.clone(),
                None => {
                    let index = state.runs.len();
                    state.run_index.insert(run.id, index);
                    state.runs.push(run.clone());
                }
            }
            debug!(run_id = %run.id, status = %run.status, "recorded sync run");
            Ok(())
        })
    }

    fn runs_for<'a>(&'a self, connection_id: &'a str) -> BoxFuture<'a, StoreResult<Vec<SyncRun>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .runs
                .iter()
                .filter(|run| run.connection_id == connection_id)
                .cloned()
                .collect())
        })
    }
}

impl CompletionStore for MemoryStore {
    fn record_completion(&self, completion: Completion) -> BoxFuture<'_, StoreResult<UpsertOutcome>> {
        Box::pin(async move {
            let mut state = self.state.write().await;
            let key = (completion.habit_id.clone(), completion.occurrence_date);
            Ok(match state.completions.insert(key, completion) {
                Some(_) => UpsertOutcome::Updated,
                None => UpsertOutcome::Inserted,
            })
        })
    }

    fn completions_for<'a>(&'a self, habit_id: &'a str) -> BoxFuture<'a, StoreResult<Vec<Completion>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .completions
                .values()
                .filter(|completion| completion.habit_id == habit_id)
                .cloned()
                .collect())
        })
    }
}

impl AttendeeStore for MemoryStore {
    fn update_attendee_status(&self, update: AttendeeUpdate) -> BoxFuture<'_, StoreResult<UpdateResult>> {
        Box::pin(async move {
            let mut guard = self.state.write().await;
            let state = &mut *guard;

            let event_live = state
                .scheduled_events
                .get(&update.event_id)
                .is_some_and(|event| event.deleted_at.is_none());
            let row = state
                .attendees
                .get_mut(&(update.event_id.clone(), update.user_id.clone()))
                .filter(|row| event_live && update.expected_version.is_none_or(|v| v == row.version));

            Ok(match row {
                Some(row) => {
                    *row = row.responded(update.status, update.responded_at);
                    UpdateResult {
                        rows_affected: 1,
                        row: Some(row.clone()),
                    }
                }
                None => UpdateResult {
                    rows_affected: 0,
                    row: None,
                },
            })
        })
    }

    fn attendance<'a>(
        &'a self,
        event_id: &'a str,
        user_id: &'a str,
    ) -> BoxFuture<'a, StoreResult<Attendance>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let live = state
                .scheduled_events
                .get(event_id)
                .is_some_and(|event| event.deleted_at.is_none());
            if !live {
                return Ok(Attendance::EventMissing);
            }
            Ok(state
                .attendees
                .get(&(event_id.to_string(), user_id.to_string()))
                .cloned()
                .map_or(Attendance::NotInvited, Attendance::Present))
        })
    }
}

impl ConnectionStore for MemoryStore {
    fn active_connections(&self) -> BoxFuture<'_, StoreResult<Vec<CalendarConnection>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .connections
                .values()
                .filter(|connection| connection.active)
                .cloned()
                .collect())
        })
    }
}
