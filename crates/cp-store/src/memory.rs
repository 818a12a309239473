// crates/cp-store/src/memory.rs
// ============================================================================
// Module: In-Memory Artifact Store
// Description: Process-local ArtifactStore backend used in tests.
// Purpose: Give unit and integration tests a store with no filesystem I/O.
// Dependencies: async-trait, cp-core, tokio
// ============================================================================

//! ## Overview
//! [`InMemoryArtifactStore`] keeps every run's artifacts, state, and metadata
//! in a single `RwLock<HashMap<..>>`. It satisfies the same `(run_id, key)`
//! serialisation guarantee as the local-fs backend by construction: all
//! writes take the same process-wide lock, so there is no concurrent-write
//! hazard to reason about. Not persisted across process restarts.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use cp_core::ArtifactId;
use cp_core::ArtifactStore;
use cp_core::ExecutionState;
use cp_core::Message;
use cp_core::RunId;
use cp_core::RunMetadata;
use cp_core::error::StoreError;

#[derive(Default)]
struct RunRecord {
    artifacts: HashMap<ArtifactId, Message>,
    state: Option<ExecutionState>,
    metadata: Option<RunMetadata>,
}

/// Process-local, non-persistent [`ArtifactStore`] implementation.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    runs: RwLock<HashMap<RunId, RunRecord>>,
}

impl InMemoryArtifactStore {
    /// Builds an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put_artifact(&self, run_id: RunId, artifact_id: &ArtifactId, message: &Message) -> Result<(), StoreError> {
        let mut runs = self.runs.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        runs.entry(run_id).or_default().artifacts.insert(artifact_id.clone(), message.clone());
        Ok(())
    }

    async fn get_artifact(&self, run_id: RunId, artifact_id: &ArtifactId) -> Result<Message, StoreError> {
        let runs = self.runs.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        runs.get(&run_id)
            .and_then(|run| run.artifacts.get(artifact_id))
            .cloned()
            .ok_or_else(|| StoreError::ArtifactNotFound { run_id, artifact_id: artifact_id.clone() })
    }

    async fn put_state(&self, run_id: RunId, state: &ExecutionState) -> Result<(), StoreError> {
        let mut runs = self.runs.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        runs.entry(run_id).or_default().state = Some(state.clone());
        Ok(())
    }

    async fn get_state(&self, run_id: RunId) -> Result<ExecutionState, StoreError> {
        let runs = self.runs.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        runs.get(&run_id).and_then(|run| run.state.clone()).ok_or(StoreError::StateNotFound(run_id))
    }

    async fn put_metadata(&self, run_id: RunId, metadata: &RunMetadata) -> Result<(), StoreError> {
        let mut runs = self.runs.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        runs.entry(run_id).or_default().metadata = Some(metadata.clone());
        Ok(())
    }

    async fn get_metadata(&self, run_id: RunId) -> Result<RunMetadata, StoreError> {
        let runs = self.runs.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        runs.get(&run_id).and_then(|run| run.metadata.clone()).ok_or(StoreError::MetadataNotFound(run_id))
    }

    async fn list_runs(&self) -> Result<Vec<RunId>, StoreError> {
        let runs = self.runs.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(runs.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use cp_core::ArtifactId;
    use cp_core::ArtifactStore;
    use cp_core::RunId;

    use super::InMemoryArtifactStore;

    #[tokio::test]
    async fn missing_artifact_is_reported_distinctly() {
        let store = InMemoryArtifactStore::new();
        let run_id = RunId::generate();
        let artifact_id = ArtifactId::new("a").expect("valid");
        let err = store.get_artifact(run_id, &artifact_id).await.expect_err("missing");
        assert!(matches!(err, cp_core::error::StoreError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn list_runs_reports_every_run_with_any_persisted_key() {
        let store = InMemoryArtifactStore::new();
        let run_id = RunId::generate();
        let artifact_id = ArtifactId::new("a").expect("valid");
        let message = crate::local_fs::tests_support::sample_message(run_id, &artifact_id);
        store.put_artifact(run_id, &artifact_id, &message).await.expect("put");
        assert_eq!(store.list_runs().await.expect("list"), vec![run_id]);
    }
}
