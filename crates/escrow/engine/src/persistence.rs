//! Load/save hook for engine state

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use escrow_types::{Contract, EscrowError, EscrowResult, WorkerProfile};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Flat collection of workers and contracts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub workers: Vec<WorkerProfile>,
    pub contracts: Vec<Contract>,
    pub saved_at: DateTime<Utc>,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The last saved snapshot, if any
    async fn load(&self) -> EscrowResult<Option<EngineSnapshot>>;

    async fn save(&self, snapshot: &EngineSnapshot) -> EscrowResult<()>;
}

/// Keeps the last snapshot in memory
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshot: RwLock<Option<EngineSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> EscrowResult<Option<EngineSnapshot>> {
        Ok(self.snapshot.read().await.clone())
    }

    async fn save(&self, snapshot: &EngineSnapshot) -> EscrowResult<()> {
        *self.snapshot.write().await = Some(snapshot.clone());
        Ok(())
    }
}

/// JSON file on disk, replaced atomically on each save
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn load(&self) -> EscrowResult<Option<EngineSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence_error(&self.path, e)),
        };

        let snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| persistence_error(&self.path, e))?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &EngineSnapshot) -> EscrowResult<()> {
        let json = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| persistence_error(&self.path, e))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence_error(parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| persistence_error(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| persistence_error(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            workers = snapshot.workers.len(),
            contracts = snapshot.contracts.len(),
            "snapshot saved"
        );
        Ok(())
    }
}

fn persistence_error(path: &Path, error: impl std::fmt::Display) -> EscrowError {
    EscrowError::Persistence(format!("{}: {}", path.display(), error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrow_types::{Amount, WorkerId};
    use std::time::Duration;

    fn snapshot() -> EngineSnapshot {
        let now = Utc::now();
        let worker = WorkerProfile::new(WorkerId::new("alice"), "Alice").with_jobs_completed(3);
        let contract = Contract::new(&worker, Amount::new(70), now, Duration::from_secs(27));
        EngineSnapshot {
            workers: vec![worker],
            contracts: vec![contract],
            saved_at: now,
        }
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load().await.unwrap().is_none());

        let snap = snapshot();
        store.save(&snap).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(snap));
    }

    #[tokio::test]
    async fn test_json_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("state").join("escrow.json"));
        assert!(store.load().await.unwrap().is_none());

        let snap = snapshot();
        store.save(&snap).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.workers, snap.workers);
        assert_eq!(loaded.contracts[0].id, snap.contracts[0].id);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("escrow.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = JsonFileSnapshotStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, EscrowError::Persistence(_)));
    }
}
