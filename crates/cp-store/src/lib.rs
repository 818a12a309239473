// crates/cp-store/src/lib.rs
// ============================================================================
// Crate: cp-store
// Description: Async, key-addressed artifact store, local-fs and in-memory
//              backends.
// Purpose: Persist run state, run metadata, and artifact payloads behind the
//          cp-core ArtifactStore contract.
// Dependencies: async-trait, cp-core, serde_json, thiserror, tokio, tracing
// ============================================================================

//! # cp-store
//!
//! Two [`cp_core::ArtifactStore`] implementations, selected by
//! [`cp_core::ArtifactStoreConfig`] (spec.md §4.4, §6.4):
//!
//! - [`local_fs::LocalFsArtifactStore`] — one directory per run under a
//!   configured root, one JSON file per key, written atomically
//!   (write-to-temp-then-rename) and serialised per `(run_id, key)` by an
//!   internal async mutex. Grounded on
//!   `decision-gate-store-sqlite`'s single-writer-thread discipline,
//!   translated from "one `SQLite` connection, one writer thread" to "one
//!   mutex per run, async tasks" since the persisted format here is
//!   JSON-per-key rather than a single database file.
//! - [`memory::InMemoryArtifactStore`] — process-local `RwLock<HashMap<..>>`,
//!   used in tests exactly as `decision-gate-store-sqlite`'s in-crate test
//!   doubles are used.

pub mod local_fs;
pub mod memory;

pub use local_fs::LocalFsArtifactStore;
pub use memory::InMemoryArtifactStore;

/// Builds the configured [`cp_core::ArtifactStore`] backend from
/// [`cp_core::ArtifactStoreConfig`].
#[must_use]
pub fn build(config: &cp_core::ArtifactStoreConfig) -> std::sync::Arc<dyn cp_core::ArtifactStore> {
    match config {
        cp_core::ArtifactStoreConfig::Local { root } => std::sync::Arc::new(LocalFsArtifactStore::new(root.clone())),
        cp_core::ArtifactStoreConfig::Memory => std::sync::Arc::new(InMemoryArtifactStore::new()),
    }
}
