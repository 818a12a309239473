// crates/cp-store/src/local_fs.rs
// ============================================================================
// Module: Local Filesystem Artifact Store
// Description: One directory per run, one JSON file per key, atomic writes.
// Purpose: Durable ArtifactStore backend for real runs (spec.md §6.3).
// Dependencies: async-trait, cp-core, serde_json, thiserror, tokio, tracing
// ============================================================================

//! ## Overview
//! Per run directory `<root>/<run_id>/` with `metadata.json`, `state.json`,
//! and `artifacts/<artifact_id>.json` (spec.md §6.3). Every write goes to a
//! sibling `.tmp` file first and is renamed into place, so a crash mid-write
//! never leaves a corrupt file behind. Writes to the same `(run_id, key)` are
//! serialised by a `tokio::sync::Mutex` held in a per-run map; writes to
//! distinct runs proceed independently, matching the "does not serialise
//! unrelated runs" requirement of spec.md §4.4.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use cp_core::ArtifactId;
use cp_core::ArtifactStore;
use cp_core::ExecutionState;
use cp_core::Message;
use cp_core::RunId;
use cp_core::RunMetadata;
use cp_core::error::StoreError;
use tokio::sync::Mutex as AsyncMutex;

/// Durable, filesystem-backed [`ArtifactStore`] implementation.
///
/// # Invariants
/// - Writes to the same `(run_id, key)` pair are serialised.
/// - A write is never observed half-written: it lands via temp-file rename.
pub struct LocalFsArtifactStore {
    root: PathBuf,
    run_locks: RwLock<HashMap<RunId, Arc<AsyncMutex<()>>>>,
}

impl LocalFsArtifactStore {
    /// Builds a store rooted at `root`. The root is created lazily on first
    /// write; it is not required to exist yet.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root, run_locks: RwLock::new(HashMap::new()) }
    }

    fn run_dir(&self, run_id: RunId) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    fn artifact_path(&self, run_id: RunId, artifact_id: &ArtifactId) -> PathBuf {
        self.run_dir(run_id).join("artifacts").join(format!("{artifact_id}.json"))
    }

    fn state_path(&self, run_id: RunId) -> PathBuf {
        self.run_dir(run_id).join("state.json")
    }

    fn metadata_path(&self, run_id: RunId) -> PathBuf {
        self.run_dir(run_id).join("metadata.json")
    }

    fn lock_for(&self, run_id: RunId) -> Arc<AsyncMutex<()>> {
        if let Some(lock) = self.run_locks.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(&run_id) {
            return Arc::clone(lock);
        }
        let mut locks = self.run_locks.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        Arc::clone(locks.entry(run_id).or_insert_with(|| Arc::new(AsyncMutex::new(()))))
    }

    #[tracing::instrument(skip(self, value), fields(path = %path.display()))]
    async fn write_atomic(&self, path: &Path, value: &impl serde::Serialize) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(StoreError::Io)?;
        }
        let body = serde_json::to_vec_pretty(value).map_err(StoreError::Serialization)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &body).await.map_err(StoreError::Io)?;
        tokio::fs::rename(&tmp_path, path).await.map_err(StoreError::Io)?;
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes).map_err(StoreError::Serialization)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalFsArtifactStore {
    #[tracing::instrument(skip(self, message), fields(%run_id, %artifact_id))]
    async fn put_artifact(&self, run_id: RunId, artifact_id: &ArtifactId, message: &Message) -> Result<(), StoreError> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;
        self.write_atomic(&self.artifact_path(run_id, artifact_id), message).await
    }

    #[tracing::instrument(skip(self), fields(%run_id, %artifact_id))]
    async fn get_artifact(&self, run_id: RunId, artifact_id: &ArtifactId) -> Result<Message, StoreError> {
        Self::read_json(&self.artifact_path(run_id, artifact_id))
            .await?
            .ok_or_else(|| StoreError::ArtifactNotFound { run_id, artifact_id: artifact_id.clone() })
    }

    #[tracing::instrument(skip(self, state), fields(%run_id))]
    async fn put_state(&self, run_id: RunId, state: &ExecutionState) -> Result<(), StoreError> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;
        self.write_atomic(&self.state_path(run_id), state).await
    }

    #[tracing::instrument(skip(self), fields(%run_id))]
    async fn get_state(&self, run_id: RunId) -> Result<ExecutionState, StoreError> {
        Self::read_json(&self.state_path(run_id)).await?.ok_or(StoreError::StateNotFound(run_id))
    }

    #[tracing::instrument(skip(self, metadata), fields(%run_id))]
    async fn put_metadata(&self, run_id: RunId, metadata: &RunMetadata) -> Result<(), StoreError> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;
        self.write_atomic(&self.metadata_path(run_id), metadata).await
    }

    #[tracing::instrument(skip(self), fields(%run_id))]
    async fn get_metadata(&self, run_id: RunId) -> Result<RunMetadata, StoreError> {
        Self::read_json(&self.metadata_path(run_id)).await?.ok_or(StoreError::MetadataNotFound(run_id))
    }

    #[tracing::instrument(skip(self))]
    async fn list_runs(&self) -> Result<Vec<RunId>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::Io(err)),
        };
        let mut run_ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(StoreError::Io)? {
            if let Some(name) = entry.file_name().to_str()
                && let Ok(run_id) = name.parse::<RunId>()
            {
                run_ids.push(run_id);
            }
        }
        Ok(run_ids)
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use cp_core::ArtifactId;
    use cp_core::ExecutionContext;
    use cp_core::Message;
    use cp_core::MessageExtensions;
    use cp_core::RunId;
    use cp_core::Schema;
    use cp_core::SchemaVersion;

    pub(crate) fn sample_message(run_id: RunId, artifact_id: &ArtifactId) -> Message {
        Message {
            id: artifact_id.to_string(),
            content: serde_json::json!({"ok": true}),
            schema: Schema::new("standard_input", SchemaVersion::DEFAULT),
            run_id,
            source: None,
            timestamp: time::OffsetDateTime::from_unix_timestamp(0).expect("valid"),
            context: None,
            extensions: MessageExtensions { execution: ExecutionContext::success(0.1) },
        }
    }
}

#[cfg(test)]
mod tests {
    use cp_core::ArtifactId;
    use cp_core::ArtifactStore;
    use cp_core::RunId;
    use tempfile::tempdir;

    use super::LocalFsArtifactStore;
    use super::tests_support::sample_message;

    #[tokio::test]
    async fn round_trips_artifact_through_atomic_write() {
        let dir = tempdir().expect("tmp dir");
        let store = LocalFsArtifactStore::new(dir.path().to_path_buf());
        let run_id = RunId::generate();
        let artifact_id = ArtifactId::new("a").expect("valid");
        let message = sample_message(run_id, &artifact_id);
        store.put_artifact(run_id, &artifact_id, &message).await.expect("put");
        let loaded = store.get_artifact(run_id, &artifact_id).await.expect("get");
        assert_eq!(loaded.id, message.id);
        assert!(!dir.path().join(run_id.to_string()).join("artifacts").join("a.json.tmp").exists());
    }

    #[tokio::test]
    async fn list_runs_reads_back_directory_names() {
        let dir = tempdir().expect("tmp dir");
        let store = LocalFsArtifactStore::new(dir.path().to_path_buf());
        let run_id = RunId::generate();
        let artifact_id = ArtifactId::new("a").expect("valid");
        store.put_artifact(run_id, &artifact_id, &sample_message(run_id, &artifact_id)).await.expect("put");
        assert_eq!(store.list_runs().await.expect("list"), vec![run_id]);
    }

    #[tokio::test]
    async fn missing_key_reports_distinct_not_found() {
        let dir = tempdir().expect("tmp dir");
        let store = LocalFsArtifactStore::new(dir.path().to_path_buf());
        let run_id = RunId::generate();
        let err = store.get_state(run_id).await.expect_err("missing");
        assert!(matches!(err, cp_core::error::StoreError::StateNotFound(_)));
    }

    #[tokio::test]
    async fn list_runs_on_missing_root_is_empty() {
        let dir = tempdir().expect("tmp dir");
        let store = LocalFsArtifactStore::new(dir.path().join("does-not-exist"));
        assert!(store.list_runs().await.expect("empty").is_empty());
    }
}
