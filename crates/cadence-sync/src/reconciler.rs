//! External calendar reconciliation.
//!
//! One run pulls the native events of a connection inside the sync window,
//! normalizes them through the provider's adapter and diffs them against the
//! stored unified events by natural key:
//!
//! ```text
//!   remote only                     -> insert
//!   both, fingerprint differs       -> update
//!   local only, or remote cancelled -> soft delete
//! ```
//!
//! A malformed native event is skipped and counted; the run ends `partial`.
//! A fetch or credential failure ends the run `failed` with nothing applied.
//! Reaching the run deadline stops the fetch, applies what was gathered
//! without deleting anything, and ends the run `partial`.

use std::collections::BTreeMap;
use std::sync::Arc;

use cadence_core::{Clock, NaturalKey, SystemClock, TimeWindow, UnifiedCalendarEvent};
use cadence_providers::{
    AccessToken, AdapterRegistry, BoxFuture, CalendarConnection, EventSource, FetchOptions,
    ProviderAdapter, ProviderError, SourceRegistry,
};
use futures_util::{StreamExt, stream};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::config::SyncConfig;
use crate::credentials::{CredentialStatus, CredentialStore};
use crate::error::{SyncError, SyncResult};
use crate::run::{RunKind, SyncRun, Trigger};
use crate::store::{EventStore, SyncRunStore, UpsertOutcome};

/// Writes a reconciliation would apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub inserts: Vec<UnifiedCalendarEvent>,
    pub updates: Vec<UnifiedCalendarEvent>,
    pub deletes: Vec<NaturalKey>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Three-way diff of `remote` against the live `local` events.
///
/// Remote events outside `window` are ignored unless cancelled. Local events
/// missing remotely are deleted only when `fetch_complete` is set and they
/// overlap `window`, since nothing is known about events the fetch did not cover.
pub fn plan_changes(
    remote: Vec<UnifiedCalendarEvent>,
    local: &[UnifiedCalendarEvent],
    window: &TimeWindow,
    fetch_complete: bool,
) -> ChangeSet {
    let local: BTreeMap<&NaturalKey, &UnifiedCalendarEvent> = local
        .iter()
        .filter(|event| !event.is_deleted())
        .map(|event| (&event.key, event))
        .collect();

    let mut remote_by_key = BTreeMap::new();
    for event in remote {
        if event.is_cancelled() || event.overlaps(window) {
            remote_by_key.insert(event.key.clone(), event);
        }
    }

    let mut changes = ChangeSet::default();
    for (key, stored) in &local {
        let gone = match remote_by_key.get(*key) {
            Some(event) => event.is_cancelled(),
            None => fetch_complete && stored.overlaps(window),
        };
        if gone {
            changes.deletes.push((*key).clone());
        }
    }

    for (key, event) in remote_by_key {
        if event.is_cancelled() {
            continue;
        }
        match local.get(&key) {
            None => changes.inserts.push(event),
            Some(stored) if stored.fingerprint() != event.fingerprint() => {
                changes.updates.push(event)
            }
            Some(_) => {}
        }
    }
    changes
}

/// Reconciles calendar connections against the event store.
pub struct Reconciler {
    adapters: AdapterRegistry,
    sources: SourceRegistry,
    credentials: Arc<dyn CredentialStore>,
    events: Arc<dyn EventStore>,
    runs: Arc<dyn SyncRunStore>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl Reconciler {
    /// Creates a reconciler with every built-in adapter and the system clock.
    pub fn new(
        events: Arc<dyn EventStore>,
        runs: Arc<dyn SyncRunStore>,
        credentials: Arc<dyn CredentialStore>,
        sources: SourceRegistry,
    ) -> Self {
        Self {
            adapters: AdapterRegistry::with_defaults(),
            sources,
            credentials,
            events,
            runs,
            clock: Arc::new(SystemClock),
            config: SyncConfig::default(),
        }
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Runs one reconciliation of `connection` and returns its record.
    ///
    /// Provider and credential failures are reported through the returned
    /// run (`failed`), not as an error.
    ///
    /// # Errors
    ///
    /// Fails before starting a run for an inactive connection or one without
    /// an adapter or source, and after marking the run failed when the store
    /// rejects a write.
    pub async fn reconcile(
        &self,
        connection: &CalendarConnection,
        triggered_by: Trigger,
        kind: RunKind,
    ) -> SyncResult<SyncRun> {
        if !connection.active {
            return Err(SyncError::InactiveConnection {
                connection_id: connection.id.clone(),
            });
        }
        let adapter = self
            .adapters
            .get(connection.provider)
            .ok_or(SyncError::MissingAdapter {
                provider: connection.provider,
            })?;
        let source = self
            .sources
            .get(connection)
            .ok_or_else(|| SyncError::MissingSource {
                connection_id: connection.id.clone(),
            })?;

        let mut run = SyncRun::start(
            &connection.id,
            &connection.workspace_id,
            triggered_by,
            kind,
            self.clock.now(),
        );
        self.runs.record_run(&run).await?;
        debug!(
            connection_id = %connection.id,
            run_id = %run.id,
            provider = %connection.provider,
            source = source.name(),
            trigger = %run.triggered_by,
            "Starting sync run"
        );

        let span = info_span!("sync_run", connection_id = %connection.id, run_id = %run.id);
        match self
            .sync_connection(connection, adapter.as_ref(), source.as_ref(), &mut run)
            .instrument(span)
            .await
        {
            Ok(()) => run.finish(self.clock.now()),
            Err(SyncError::ProviderFetch(e)) => {
                error!(
                    connection_id = %connection.id,
                    run_id = %run.id,
                    code = %e.code(),
                    error = %e,
                    "Provider fetch failed"
                );
                run.fail(e.to_string(), self.clock.now());
            }
            Err(e) => {
                run.fail(e.to_string(), self.clock.now());
                if let Err(record_err) = self.runs.record_run(&run).await {
                    warn!(run_id = %run.id, error = %record_err, "Failed to record failed run");
                }
                return Err(e);
            }
        }
        self.runs.record_run(&run).await?;

        info!(
            connection_id = %connection.id,
            run_id = %run.id,
            status = %run.status,
            inserted = run.counts.inserted,
            updated = run.counts.updated,
            deleted = run.counts.deleted,
            errors = run.error_count,
            timed_out = run.timed_out,
            "Sync run finished"
        );
        Ok(run)
    }

    /// Reconciles `connections` concurrently, at most `max_concurrent_runs` at a time.
    ///
    /// Results are in completion order, paired with the connection id.
    pub async fn reconcile_all(
        &self,
        connections: &[CalendarConnection],
        triggered_by: Trigger,
        kind: RunKind,
    ) -> Vec<(String, SyncResult<SyncRun>)> {
        stream::iter(connections.iter().cloned())
            .map(|connection| -> BoxFuture<'_, (String, SyncResult<SyncRun>)> {
                let triggered_by = triggered_by.clone();
                Box::pin(async move {
                    let result = self.reconcile(&connection, triggered_by, kind).await;
                    (connection.id, result)
                })
            })
            .buffer_unordered(self.config.max_concurrent_runs.max(1))
            .collect()
            .await
    }

    async fn sync_connection(
        &self,
        connection: &CalendarConnection,
        adapter: &dyn ProviderAdapter,
        source: &dyn EventSource,
        run: &mut SyncRun,
    ) -> SyncResult<()> {
        let token = match self.credentials.credential(connection).await? {
            CredentialStatus::Valid(token) => token,
            CredentialStatus::Invalid { reason } => {
                return Err(ProviderError::authentication(format!("credential invalid: {reason}"))
                    .with_provider(connection.provider.as_str())
                    .into());
            }
        };

        let window = self.config.window_at(run.started_at);
        let remote = self
            .fetch_remote(connection, &token, adapter, source, window, run)
            .await?;
        let local = self.events.load_events(&connection.id).await?;
        let changes = plan_changes(remote, &local, &window, !run.timed_out);
        trace!(
            connection_id = %connection.id,
            inserts = changes.inserts.len(),
            updates = changes.updates.len(),
            deletes = changes.deletes.len(),
            "Planned changes"
        );
        self.apply(changes, run).await
    }

    /// Pulls every page of the window, normalizing as pages arrive.
    async fn fetch_remote(
        &self,
        connection: &CalendarConnection,
        token: &AccessToken,
        adapter: &dyn ProviderAdapter,
        source: &dyn EventSource,
        window: TimeWindow,
        run: &mut SyncRun,
    ) -> SyncResult<Vec<UnifiedCalendarEvent>> {
        let deadline = Instant::now() + self.config.run_deadline;
        let options = FetchOptions::new(window).with_page_size(self.config.page_size);

        let mut remote = Vec::new();
        let mut page_token = None;
        loop {
            let fetch = source.fetch_page(connection, token, options, page_token.take());
            let page = match tokio::time::timeout_at(deadline, fetch).await {
                Ok(page) => page?,
                Err(_) => {
                    warn!(
                        connection_id = %connection.id,
                        deadline_secs = self.config.run_deadline.as_secs(),
                        fetched = remote.len(),
                        "Run deadline reached, stopping fetch"
                    );
                    run.timed_out = true;
                    break;
                }
            };
            trace!(connection_id = %connection.id, events = page.events.len(), "Fetched page");

            for native in &page.events {
                match adapter.normalize(native, connection) {
                    Ok(event) => remote.push(event),
                    Err(e) => {
                        let hint = native.hint();
                        warn!(
                            connection_id = %connection.id,
                            event = hint.as_deref().unwrap_or("<unknown>"),
                            error = %e,
                            "Skipping malformed native event"
                        );
                        run.error_count += 1;
                    }
                }
            }

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }
        Ok(remote)
    }

    async fn apply(&self, changes: ChangeSet, run: &mut SyncRun) -> SyncResult<()> {
        for event in changes.inserts.into_iter().chain(changes.updates) {
            match self.events.upsert_event(event).await? {
                UpsertOutcome::Inserted => run.counts.inserted += 1,
                UpsertOutcome::Updated => run.counts.updated += 1,
                UpsertOutcome::Unchanged => {}
            }
        }

        let now = self.clock.now();
        for key in &changes.deletes {
            if self.events.soft_delete_event(key, now).await? {
                run.counts.deleted += 1;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("adapters", &self.adapters)
            .field("sources", &self.sources)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
