//! Stateful services: reconciliation, RSVP, habit tracking, scheduling.
//!
//! This crate ties the pure computations of `cadence-core` and the provider
//! boundary of `cadence-providers` to persistence:
//! - [`Reconciler`] diffs a connection's remote events against stored ones
//!   and records a [`SyncRun`] per reconciliation
//! - [`RsvpService`] applies attendee responses with optimistic concurrency
//! - [`HabitTracker`] records completions and derives streak reports
//! - [`Scheduler`] runs reconciliation rounds in the background
//!
//! Persistence is reached only through the traits of the store module;
//! [`MemoryStore`] implements all of them.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cadence_providers::{CalendarConnection, ProviderKind, SourceRegistry, StaticSource};
//! use cadence_sync::{MemoryStore, Reconciler, RunKind, StaticCredentials, Trigger};
//!
//! # async fn example() -> Result<(), cadence_sync::SyncError> {
//! let store = Arc::new(MemoryStore::new());
//! let sources = SourceRegistry::new()
//!     .with_provider(ProviderKind::Google, Arc::new(StaticSource::new("google", vec![])));
//! let credentials = StaticCredentials::new().with_token("conn-1", "token");
//! let reconciler = Reconciler::new(store.clone(), store.clone(), Arc::new(credentials), sources);
//!
//! let connection = CalendarConnection::new("conn-1", "ws-1", ProviderKind::Google, "primary");
//! let run = reconciler
//!     .reconcile(&connection, Trigger::System, RunKind::Background)
//!     .await?;
//! println!("{} inserted={}", run.status, run.counts.inserted);
//! # Ok(())
//! # }
//! ```

mod cache;
mod config;
mod credentials;
mod error;
mod habits;
mod reconciler;
mod rsvp;
mod run;
mod scheduler;
mod store;

pub use cache::{ExpansionKey, OccurrenceCache};
pub use config::{SyncConfig, TrackerConfig};
pub use credentials::{CredentialStatus, CredentialStore, StaticCredentials};
pub use error::{StoreError, SyncError, SyncResult};
pub use habits::{HabitReport, HabitTracker};
pub use reconciler::{ChangeSet, Reconciler, plan_changes};
pub use rsvp::RsvpService;
pub use run::{RunKind, SyncCounts, SyncRun, SyncStatus, Trigger};
pub use scheduler::{
    RoundSummary, Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle, SchedulerState,
    SharedSchedulerState, SyncJob,
};
pub use store::{
    Attendance, AttendeeStore, AttendeeUpdate, CompletionStore, ConnectionStore, EventStore,
    MemoryStore, StoreResult, StoreSnapshot, SyncRunStore, UpdateResult, UpsertOutcome,
};
