//! JSON state file backing offline reconciliation.

use std::path::Path;

use cadence_sync::{MemoryStore, StoreSnapshot};
use tracing::debug;

use crate::error::{CliError, CliResult};

/// Loads the store saved at `path`. A missing file is an empty store.
pub fn load(path: &Path) -> CliResult<MemoryStore> {
    if !path.exists() {
        debug!(path = %path.display(), "No state file yet, starting empty");
        return Ok(MemoryStore::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    let snapshot: StoreSnapshot =
        serde_json::from_str(&content).map_err(|e| CliError::json(path, e))?;
    debug!(
        path = %path.display(),
        events = snapshot.events.len(),
        runs = snapshot.runs.len(),
        "Loaded state"
    );
    Ok(MemoryStore::from_snapshot(snapshot))
}

/// Writes the store to `path`, replacing the previous file atomically.
pub async fn save(path: &Path, store: &MemoryStore) -> CliResult<()> {
    let snapshot = store.snapshot().await;
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| CliError::json(path, e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CliError::io(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| CliError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| CliError::io(path, e))?;
    debug!(path = %path.display(), "Saved state");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_providers::{CalendarConnection, ProviderKind};

    #[tokio::test]
    async fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = load(&dir.path().join("state.json")).unwrap();
        assert_eq!(store.snapshot().await, StoreSnapshot::default());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = MemoryStore::new();
        store
            .add_connection(CalendarConnection::new("work", "ws", ProviderKind::Google, "primary"))
            .await;
        save(&path, &store).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.snapshot().await, store.snapshot().await);
    }

    #[test]
    fn corrupt_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, CliError::Json { .. }));
        assert!(err.to_string().contains("state.json"));
    }
}
