//! Background scheduler for calendar reconciliation.
//!
//! Periodically reconciles every active connection, with:
//! - a configurable interval plus jitter so workers don't align
//! - exponential backoff while rounds keep failing
//! - `SyncNow`, `Pause`, `Resume` and `Stop` commands through a handle
//!
//! This is the retry point for provider fetch failures; the reconciler itself
//! never retries within a run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cadence_core::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::reconciler::Reconciler;
use crate::run::{RunKind, SyncRun, SyncStatus, Trigger};
use crate::store::ConnectionStore;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base interval between rounds.
    pub sync_interval: Duration,
    /// Maximum jitter added to the interval, as a fraction of it (0.0-1.0).
    pub jitter_fraction: f64,
    /// Delay after the first failed round.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(15 * 60),
            jitter_fraction: 0.1,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(30 * 60),
            backoff_multiplier: 2.0,
        }
    }
}

impl SchedulerConfig {
    pub fn new(sync_interval: Duration) -> Self {
        Self {
            sync_interval,
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Interval with jitter applied.
    pub fn next_sync_delay(&self) -> Duration {
        let base = self.sync_interval.as_secs_f64();
        let jitter = rand_jitter(base * self.jitter_fraction);
        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Backoff after `consecutive_failures` failed rounds.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(consecutive_failures - 1).unwrap_or(i32::MAX);
        let delay = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_backoff.as_secs_f64()))
    }
}

/// Pseudo-random value in `[-range, range]` from the sub-second clock.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;

    if range <= 0.0 {
        return 0.0;
    }
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    let fraction = f64::from(nanos) / 1_000_000_000.0;
    (fraction * 2.0 - 1.0) * range
}

/// Commands accepted by a running scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run a round now, even while paused.
    SyncNow { triggered_by: Trigger },
    Pause,
    Resume,
    Stop,
}

/// Scheduler state, shared with handles.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    pub paused: bool,
    pub consecutive_failures: u32,
    pub rounds: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SchedulerState {
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.rounds += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(at);
        self.last_attempt = Some(at);
        self.last_error = None;
    }

    pub fn record_failure(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.rounds += 1;
        self.consecutive_failures += 1;
        self.last_attempt = Some(at);
        self.last_error = Some(error.into());
    }
}

pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Reconciles all active connections of a store in one round.
pub struct SyncJob {
    reconciler: Arc<Reconciler>,
    connections: Arc<dyn ConnectionStore>,
}

/// Outcome of one round.
#[derive(Debug, Clone, Default)]
pub struct RoundSummary {
    pub runs: Vec<SyncRun>,
    /// Connections that could not start a run, as `(connection id, error)`.
    pub errors: Vec<(String, String)>,
}

impl RoundSummary {
    /// Failed runs plus connections that could not run.
    pub fn failures(&self) -> usize {
        self.runs
            .iter()
            .filter(|run| run.status == SyncStatus::Failed)
            .count()
            + self.errors.len()
    }

    /// `Err` describing the failures, if any.
    pub fn into_result(self) -> Result<(), String> {
        let failures = self.failures();
        if failures == 0 {
            return Ok(());
        }
        let total = self.runs.len() + self.errors.len();
        let first = self
            .runs
            .iter()
            .find_map(|run| run.error.clone())
            .or_else(|| self.errors.first().map(|(_, e)| e.clone()))
            .unwrap_or_default();
        Err(format!("{failures} of {total} connections failed: {first}"))
    }
}

impl SyncJob {
    pub fn new(reconciler: Arc<Reconciler>, connections: Arc<dyn ConnectionStore>) -> Self {
        Self {
            reconciler,
            connections,
        }
    }

    /// Reconciles every active connection once.
    ///
    /// # Errors
    ///
    /// Fails only when the active connections cannot be listed; per-connection
    /// problems are reported in the summary.
    pub async fn run_round(&self, triggered_by: Trigger, kind: RunKind) -> SyncResult<RoundSummary> {
        let connections = self.connections.active_connections().await?;
        let results = self
            .reconciler
            .reconcile_all(&connections, triggered_by, kind)
            .await;

        let mut summary = RoundSummary::default();
        for (connection_id, result) in results {
            match result {
                Ok(run) => summary.runs.push(run),
                Err(e) => summary.errors.push((connection_id, e.to_string())),
            }
        }
        Ok(summary)
    }
}

/// Runs sync rounds on a timer and on command.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    state: SharedSchedulerState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            clock: Arc::new(SystemClock),
            state: Arc::new(RwLock::new(SchedulerState::default())),
            command_tx,
            command_rx,
        }
    }

    /// Clock used to stamp `last_success` and `last_attempt`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> SharedSchedulerState {
        self.state.clone()
    }

    /// Runs `job` rounds until stopped. A round with any failed connection
    /// counts as failed for backoff.
    pub async fn run_job(self, job: Arc<SyncJob>) {
        self.run(move |triggered_by, kind| {
            let job = job.clone();
            async move {
                job.run_round(triggered_by, kind)
                    .await
                    .map_err(|e| e.to_string())?
                    .into_result()
            }
        })
        .await
    }

    /// Runs the scheduler loop with the given round function.
    ///
    /// One round runs immediately, then one per interval. The loop ends on
    /// `Stop` or when every handle is dropped.
    pub async fn run<F, Fut>(self, sync_fn: F)
    where
        F: Fn(Trigger, RunKind) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        let Self {
            config,
            clock,
            state,
            command_tx,
            mut command_rx,
        } = self;
        // Only external handles keep the loop alive.
        drop(command_tx);

        info!(
            interval_secs = config.sync_interval.as_secs(),
            "Scheduler started"
        );

        do_sync(&state, clock.as_ref(), &sync_fn, Trigger::System, RunKind::Background).await;

        loop {
            let delay = next_delay(&config, &state).await;
            debug!(delay_secs = delay.as_secs(), "Scheduling next sync");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if state.read().await.paused {
                        debug!("Scheduler paused, skipping sync");
                        continue;
                    }
                    do_sync(&state, clock.as_ref(), &sync_fn, Trigger::System, RunKind::Background).await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::SyncNow { triggered_by }) => {
                            debug!(trigger = %triggered_by, "Received SyncNow command");
                            do_sync(&state, clock.as_ref(), &sync_fn, triggered_by, RunKind::Active).await;
                        }
                        Some(SchedulerCommand::Pause) => {
                            info!("Scheduler paused");
                            state.write().await.paused = true;
                        }
                        Some(SchedulerCommand::Resume) => {
                            info!("Scheduler resumed");
                            state.write().await.paused = false;
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!("Scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn next_delay(config: &SchedulerConfig, state: &SharedSchedulerState) -> Duration {
    let failures = state.read().await.consecutive_failures;
    if failures > 0 {
        let backoff = config.backoff_delay(failures);
        debug!(
            failures,
            backoff_secs = backoff.as_secs(),
            "Using backoff delay"
        );
        return backoff;
    }
    config.next_sync_delay()
}

async fn do_sync<F, Fut>(
    state: &SharedSchedulerState,
    clock: &dyn Clock,
    sync_fn: &F,
    triggered_by: Trigger,
    kind: RunKind,
) where
    F: Fn(Trigger, RunKind) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    debug!(trigger = %triggered_by, "Starting sync round");
    match sync_fn(triggered_by, kind).await {
        Ok(()) => {
            info!("Sync round completed");
            state.write().await.record_success(clock.now());
        }
        Err(e) => {
            warn!(error = %e, "Sync round failed");
            state.write().await.record_failure(e, clock.now());
        }
    }
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    pub async fn sync_now(
        &self,
        triggered_by: Trigger,
    ) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx
            .send(SchedulerCommand::SyncNow { triggered_by })
            .await
    }

    pub async fn pause(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Pause).await
    }

    pub async fn resume(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Resume).await
    }

    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }

    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(interval_secs: u64) -> SchedulerConfig {
        SchedulerConfig::new(Duration::from_secs(interval_secs))
            .with_jitter(0.0)
            .with_backoff(Duration::from_secs(10), Duration::from_secs(40), 2.0)
    }

    mod config {
        use super::*;

        #[test]
        fn defaults() {
            let config = SchedulerConfig::default();
            assert_eq!(config.sync_interval, Duration::from_secs(900));
            assert_eq!(config.backoff_delay(0), Duration::ZERO);
        }

        #[test]
        fn backoff_grows_and_caps() {
            let config = config(60);
            assert_eq!(config.backoff_delay(1), Duration::from_secs(10));
            assert_eq!(config.backoff_delay(2), Duration::from_secs(20));
            assert_eq!(config.backoff_delay(3), Duration::from_secs(40));
            assert_eq!(config.backoff_delay(9), Duration::from_secs(40));
        }

        #[test]
        fn jitter_stays_in_range() {
            let config = SchedulerConfig::new(Duration::from_secs(100)).with_jitter(0.1);
            for _ in 0..20 {
                let delay = config.next_sync_delay();
                assert!(delay >= Duration::from_secs(90) && delay <= Duration::from_secs(110));
            }
            assert_eq!(super::config(100).next_sync_delay(), Duration::from_secs(100));
        }
    }

    mod looping {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn rounds_follow_the_interval() {
            let scheduler = Scheduler::new(config(60));
            let handle = scheduler.handle();
            let count = Arc::new(AtomicU32::new(0));
            let counter = count.clone();
            let task = tokio::spawn(scheduler.run(move |_, _| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), String>(())
                }
            }));

            tokio::time::sleep(Duration::from_secs(150)).await;
            assert_eq!(count.load(Ordering::SeqCst), 3);
            let state = handle.state().await;
            assert_eq!(state.rounds, 3);
            assert!(state.last_success.is_some());

            handle.stop().await.unwrap();
            task.await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn failures_back_off() {
            let scheduler = Scheduler::new(config(60));
            let handle = scheduler.handle();
            let count = Arc::new(AtomicU32::new(0));
            let counter = count.clone();
            let task = tokio::spawn(scheduler.run(move |_, _| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), String>("provider unreachable".to_string())
                }
            }));

            // Rounds at 0, 10, 30 and 70 seconds.
            tokio::time::sleep(Duration::from_secs(75)).await;
            assert_eq!(count.load(Ordering::SeqCst), 4);
            let state = handle.state().await;
            assert_eq!(state.consecutive_failures, 4);
            assert_eq!(state.last_error.as_deref(), Some("provider unreachable"));
            assert!(state.last_success.is_none());

            handle.stop().await.unwrap();
            task.await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn sync_now_carries_the_trigger() {
            let scheduler = Scheduler::new(config(3600));
            let handle = scheduler.handle();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let log = seen.clone();
            let task = tokio::spawn(scheduler.run(move |trigger, kind| {
                log.lock().unwrap().push((trigger, kind));
                async { Ok::<(), String>(()) }
            }));

            handle.sync_now(Trigger::User("u-1".into())).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
            assert_eq!(
                *seen.lock().unwrap(),
                vec![
                    (Trigger::System, RunKind::Background),
                    (Trigger::User("u-1".into()), RunKind::Active),
                ]
            );

            handle.stop().await.unwrap();
            task.await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn pause_skips_timed_rounds_until_resumed() {
            let scheduler = Scheduler::new(config(60));
            let handle = scheduler.handle();
            let count = Arc::new(AtomicU32::new(0));
            let counter = count.clone();
            let task = tokio::spawn(scheduler.run(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<(), String>(()) }
            }));

            handle.pause().await.unwrap();
            tokio::time::sleep(Duration::from_secs(130)).await;
            assert_eq!(count.load(Ordering::SeqCst), 1);
            assert!(handle.state().await.paused);

            handle.resume().await.unwrap();
            tokio::time::sleep(Duration::from_secs(61)).await;
            assert_eq!(count.load(Ordering::SeqCst), 2);

            handle.stop().await.unwrap();
            task.await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn dropping_every_handle_stops_the_loop() {
            let scheduler = Scheduler::new(config(60));
            let handle = scheduler.handle();
            let task = tokio::spawn(scheduler.run(|_, _| async { Ok::<(), String>(()) }));
            drop(handle);
            task.await.unwrap();
        }
    }

    mod job {
        use super::*;
        use crate::credentials::StaticCredentials;
        use crate::store::{EventStore, MemoryStore, SyncRunStore};
        use cadence_core::FixedClock;
        use cadence_providers::{
            CalendarConnection, ErrorSource, NativeEvent, ProviderError, ProviderKind,
            SourceRegistry, StaticSource,
        };
        use chrono::TimeZone;
        use serde_json::json;

        async fn job(sources: SourceRegistry) -> (Arc<MemoryStore>, SyncJob) {
            let store = Arc::new(MemoryStore::new());
            store
                .add_connection(CalendarConnection::new("conn-1", "ws", ProviderKind::Google, "primary"))
                .await;
            store
                .add_connection(
                    CalendarConnection::new("conn-off", "ws", ProviderKind::Google, "old").with_active(false),
                )
                .await;
            let reconciler = Reconciler::new(
                store.clone(),
                store.clone(),
                Arc::new(StaticCredentials::new().with_token("conn-1", "t")),
                sources,
            )
            .with_clock(Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            )));
            let job = SyncJob::new(Arc::new(reconciler), store.clone());
            (store, job)
        }

        #[tokio::test]
        async fn round_covers_active_connections_only() {
            let event = NativeEvent::json(json!({
                "id": "a",
                "summary": "Standup",
                "start": {"dateTime": "2024-05-02T09:00:00Z"},
                "end": {"dateTime": "2024-05-02T09:15:00Z"},
            }));
            let sources = SourceRegistry::new()
                .with_provider(ProviderKind::Google, Arc::new(StaticSource::new("google", vec![event])));
            let (store, job) = job(sources).await;

            let summary = job.run_round(Trigger::System, RunKind::Background).await.unwrap();
            assert_eq!(summary.runs.len(), 1);
            assert_eq!(summary.runs[0].connection_id, "conn-1");
            assert_eq!(summary.failures(), 0);
            assert!(summary.into_result().is_ok());
            assert_eq!(store.load_events("conn-1").await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn failed_runs_fail_the_round() {
            let sources = SourceRegistry::new().with_provider(
                ProviderKind::Google,
                Arc::new(ErrorSource::new("google", ProviderError::network("timed out"))),
            );
            let (_store, job) = job(sources).await;

            let summary = job.run_round(Trigger::System, RunKind::Background).await.unwrap();
            assert_eq!(summary.failures(), 1);
            let message = summary.into_result().unwrap_err();
            assert!(message.starts_with("1 of 1 connections failed"));
            assert!(message.contains("timed out"));
        }

        #[tokio::test(start_paused = true)]
        async fn scheduler_drives_the_job() {
            let sources = SourceRegistry::new().with_provider(
                ProviderKind::Google,
                Arc::new(StaticSource::new("google", vec![])),
            );
            let (store, job) = job(sources).await;
            let scheduler = Scheduler::new(config(60));
            let handle = scheduler.handle();
            let task = tokio::spawn(scheduler.run_job(Arc::new(job)));

            tokio::time::sleep(Duration::from_secs(61)).await;
            handle.stop().await.unwrap();
            task.await.unwrap();

            assert_eq!(store.runs_for("conn-1").await.unwrap().len(), 2);
            assert_eq!(handle.state().await.consecutive_failures, 0);
        }

        #[tokio::test(start_paused = true)]
        async fn rounds_are_stamped_by_the_clock() {
            let noon = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
            let scheduler = Scheduler::new(config(60)).with_clock(Arc::new(FixedClock::new(noon)));
            let handle = scheduler.handle();
            let task = tokio::spawn(scheduler.run(|_, _| async { Err::<(), String>("down".into()) }));

            tokio::time::sleep(Duration::from_secs(1)).await;
            let state = handle.state().await;
            assert_eq!(state.last_attempt, Some(noon));
            assert_eq!(state.last_success, None);

            handle.stop().await.unwrap();
            task.await.unwrap();
        }
    }
}
