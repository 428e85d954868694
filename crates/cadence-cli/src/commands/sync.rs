//! Offline reconciliation of a file of provider events.
//!
//! The events file is a JSON array. Each element is either a tagged native
//! event (`{"format": "json" | "ical", "payload": ...}`), a bare provider
//! JSON object, or a string holding iCalendar text.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use cadence_providers::{
    AccessToken, BoxFuture, CalendarConnection, NativeEvent, SourceRegistry, StaticSource,
};
use cadence_sync::{
    CredentialStatus, CredentialStore, Reconciler, RunKind, StoreError, SyncRun, SyncStatus,
    Trigger,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::commands::print_json;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::secret;
use crate::state;

/// Resolves connection tokens from the `token` entries of the configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentials {
    tokens: HashMap<String, String>,
}

impl ConfigCredentials {
    pub fn from_config(config: &CliConfig) -> Self {
        let tokens = config
            .connections
            .iter()
            .filter_map(|c| c.token.clone().map(|token| (c.id.clone(), token)))
            .collect();
        Self { tokens }
    }

    fn status(&self, credential_ref: &str) -> CredentialStatus {
        let Some(reference) = self.tokens.get(credential_ref) else {
            return CredentialStatus::invalid("no token configured");
        };
        match secret::resolve(reference) {
            Ok(token) if token.trim().is_empty() => CredentialStatus::invalid("token is empty"),
            Ok(token) => CredentialStatus::Valid(AccessToken::new(token)),
            Err(e) => CredentialStatus::invalid(e.to_string()),
        }
    }
}

impl CredentialStore for ConfigCredentials {
    fn credential<'a>(
        &'a self,
        connection: &'a CalendarConnection,
    ) -> BoxFuture<'a, Result<CredentialStatus, StoreError>> {
        Box::pin(async move { Ok(self.status(&connection.credential_ref)) })
    }
}

/// Parses the contents of an events file.
pub fn parse_events(content: &str, path: &Path) -> CliResult<Vec<NativeEvent>> {
    let value: Value = serde_json::from_str(content).map_err(|e| CliError::json(path, e))?;
    let Value::Array(items) = value else {
        return Err(CliError::Config(format!(
            "{}: expected a JSON array of events",
            path.display()
        )));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(text) => Ok(NativeEvent::ical(text)),
            item if item.get("format").is_some() => {
                serde_json::from_value(item).map_err(|e| CliError::json(path, e))
            }
            other => Ok(NativeEvent::json(other)),
        })
        .collect()
}

/// Reconciles the events in `events_path` for the configured connection
/// `connection_id`, persisting the result in `state_path`.
pub async fn reconcile_file(
    config: &CliConfig,
    connection_id: &str,
    events_path: &Path,
    state_path: &Path,
    trigger: Trigger,
) -> CliResult<SyncRun> {
    let connection = config.connection(connection_id)?.to_connection()?;

    let content = std::fs::read_to_string(events_path).map_err(|e| CliError::io(events_path, e))?;
    let events = parse_events(&content, events_path)?;
    debug!(count = events.len(), path = %events_path.display(), "Read native events");

    let store = Arc::new(state::load(state_path)?);
    store.add_connection(connection.clone()).await;

    let sources = SourceRegistry::new().with_connection(
        &connection.id,
        Arc::new(StaticSource::new(events_path.display().to_string(), events)),
    );
    let reconciler = Reconciler::new(
        store.clone(),
        store.clone(),
        Arc::new(ConfigCredentials::from_config(config)),
        sources,
    )
    .with_config(config.sync.clone());

    let run = reconciler
        .reconcile(&connection, trigger, RunKind::Active)
        .await?;
    state::save(state_path, &store).await?;
    info!(run_id = %run.id, status = %run.status, "Saved state");
    Ok(run)
}

pub async fn run(
    config: &CliConfig,
    connection_id: &str,
    events_path: &Path,
    state_path: &Path,
    user: Option<String>,
    json: bool,
) -> CliResult<()> {
    let trigger = user.map_or(Trigger::System, Trigger::User);
    let run = reconcile_file(config, connection_id, events_path, state_path, trigger).await?;

    if json {
        print_json(&run)?;
    } else {
        println!(
            "{} {}: inserted={} updated={} deleted={} skipped={}",
            run.connection_id,
            run.status,
            run.counts.inserted,
            run.counts.updated,
            run.counts.deleted,
            run.error_count
        );
        if run.timed_out {
            println!("deadline reached, stale events were kept");
        }
    }

    if run.status == SyncStatus::Failed {
        return Err(CliError::RunFailed {
            run_id: run.id.to_string(),
            message: run.error.unwrap_or_default(),
        });
    }
    Ok(())
}
