// crates/cp-core/src/schema_registry.rs
// ============================================================================
// Module: Schema Registry
// Description: Loads and caches JSON-schema descriptors by (name, version).
// Purpose: Give the planner and executor a single process-wide source of
//          schema bodies without re-reading disk on every lookup.
// Dependencies: serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`SchemaRegistry`] resolves a [`Schema`] identity to its JSON body by
//! searching a fixed, ordered list of root directories for
//! `<root>/<name>/<version>.json`. The first successful read wins; the body
//! is cached so repeated [`SchemaRegistry::load`] calls for the same key
//! return the same `Arc` (pointer-stable, per the "schema objects are
//! shared" ownership rule). A `version` field inside the loaded JSON must
//! match the requested version or loading fails distinctly from a missing
//! file.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;

use thiserror::Error;

use crate::schema::Schema;

/// Error returned when a schema cannot be loaded.
#[derive(Debug, Error)]
pub enum SchemaLoadError {
    /// No file was found for `(name, version)` in any search path.
    #[error("schema '{0}' not found in any configured search path")]
    NotFound(Schema),
    /// The file existed but could not be read.
    #[error("schema '{schema}' could not be read: {source}")]
    Io {
        /// Schema that failed to load.
        schema: Schema,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file existed but was not valid JSON.
    #[error("schema '{schema}' is not valid JSON: {source}")]
    InvalidJson {
        /// Schema that failed to load.
        schema: Schema,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// The file's own `version` field disagreed with the requested version.
    #[error("schema '{schema}' declares version '{declared}' internally, which does not match the requested version")]
    VersionMismatch {
        /// Schema that was requested.
        schema: Schema,
        /// Version string found inside the loaded JSON body.
        declared: String,
    },
}

/// Loads and caches schema JSON bodies by `(name, version)` identity.
///
/// # Invariants
/// - Repeated `load` calls for the same key return the same cached `Arc`.
/// - Thread-safe: concurrent loads of distinct keys never block one another
///   for longer than the internal lock is held.
pub struct SchemaRegistry {
    search_paths: Vec<PathBuf>,
    cache: RwLock<HashMap<Schema, Arc<serde_json::Value>>>,
}

impl SchemaRegistry {
    /// Builds a registry that searches `search_paths` in order.
    #[must_use]
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths, cache: RwLock::new(HashMap::new()) }
    }

    /// Loads the JSON body for `schema`, consulting the cache first.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaLoadError::NotFound`] when no search path contains a
    /// matching file, [`SchemaLoadError::Io`] / [`SchemaLoadError::InvalidJson`]
    /// when a matching file exists but cannot be read or parsed, and
    /// [`SchemaLoadError::VersionMismatch`] when the file's own `version`
    /// field disagrees with `schema.version`.
    pub fn load(&self, schema: &Schema) -> Result<Arc<serde_json::Value>, SchemaLoadError> {
        if let Some(cached) = self.cache.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(schema) {
            return Ok(Arc::clone(cached));
        }

        let body = Arc::new(self.read_from_disk(schema)?);
        let mut cache = self.cache.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(schema.clone()).or_insert(body)))
    }

    fn read_from_disk(&self, schema: &Schema) -> Result<serde_json::Value, SchemaLoadError> {
        let relative = format!("{}/{}.json", schema.name.as_str(), schema.version);
        for root in &self.search_paths {
            let candidate = root.join(&relative);
            match std::fs::read_to_string(&candidate) {
                Ok(text) => return Self::parse_and_check(schema, &text),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(SchemaLoadError::Io { schema: schema.clone(), source }),
            }
        }
        Err(SchemaLoadError::NotFound(schema.clone()))
    }

    fn parse_and_check(schema: &Schema, text: &str) -> Result<serde_json::Value, SchemaLoadError> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|source| SchemaLoadError::InvalidJson { schema: schema.clone(), source })?;
        if let Some(declared) = value.get("version").and_then(serde_json::Value::as_str)
            && declared != schema.version.to_string()
        {
            return Err(SchemaLoadError::VersionMismatch { schema: schema.clone(), declared: declared.to_owned() });
        }
        Ok(value)
    }

    /// Returns the configured search roots, in lookup order.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

/// Returns `true` when `path` is already present among a registry's search
/// roots; used by callers assembling search path lists to avoid duplicates.
#[must_use]
pub fn contains_root(search_paths: &[PathBuf], path: &Path) -> bool {
    search_paths.iter().any(|root| root == path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::SchemaRegistry;
    use crate::schema::Schema;
    use crate::schema::SchemaVersion;

    #[test]
    fn missing_schema_is_reported_distinctly() {
        let dir = tempdir().expect("tmp dir");
        let registry = SchemaRegistry::new(vec![dir.path().to_path_buf()]);
        let schema = Schema::new("absent", SchemaVersion::DEFAULT);
        assert!(matches!(registry.load(&schema), Err(super::SchemaLoadError::NotFound(_))));
    }

    #[test]
    fn repeated_load_returns_pointer_stable_cache_entry() {
        let dir = tempdir().expect("tmp dir");
        fs::create_dir_all(dir.path().join("finding")).expect("mkdir");
        fs::write(dir.path().join("finding/1.0.0.json"), r#"{"version": "1.0.0", "type": "object"}"#)
            .expect("write");
        let registry = SchemaRegistry::new(vec![dir.path().to_path_buf()]);
        let schema = Schema::new("finding", SchemaVersion::DEFAULT);
        let first = registry.load(&schema).expect("loads");
        let second = registry.load(&schema).expect("loads");
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn internal_version_mismatch_is_reported_distinctly() {
        let dir = tempdir().expect("tmp dir");
        fs::create_dir_all(dir.path().join("finding")).expect("mkdir");
        fs::write(dir.path().join("finding/1.0.0.json"), r#"{"version": "2.0.0"}"#).expect("write");
        let registry = SchemaRegistry::new(vec![dir.path().to_path_buf()]);
        let schema = Schema::new("finding", SchemaVersion::DEFAULT);
        assert!(matches!(registry.load(&schema), Err(super::SchemaLoadError::VersionMismatch { .. })));
    }
}
