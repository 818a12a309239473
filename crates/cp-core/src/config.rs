// crates/cp-core/src/config.rs
// ============================================================================
// Module: Artifact Store Configuration
// Description: Environment-derived configuration selecting the store backend.
// Purpose: Give cp-store a typed, validated configuration independent of env
//          variable lookup mechanics.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The artifact store backend is selected through two environment
//! variables, `ANALYSER_STORE_TYPE` and `ANALYSER_STORE_PATH` (§6.4).
//! [`ArtifactStoreConfig::from_env`] resolves and validates them fail-closed,
//! following the teacher's config-loading guard style: reject early rather
//! than defer to a confusing failure deep inside the store.

use std::path::PathBuf;

use thiserror::Error;

/// Selects which [`crate::contracts::ArtifactStore`] implementation is
/// constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStoreConfig {
    /// One directory per run under `root`, one JSON file per key.
    Local {
        /// Filesystem root for persisted runs.
        root: PathBuf,
    },
    /// Process-local, not persisted across restarts; used in tests.
    Memory,
}

/// Error returned when the store configuration environment is invalid.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `ANALYSER_STORE_TYPE` held a value other than `local` or `memory`.
    #[error("invalid ANALYSER_STORE_TYPE '{0}': expected 'local' or 'memory'")]
    UnknownStoreType(String),
    /// `ANALYSER_STORE_TYPE=local` was set without `ANALYSER_STORE_PATH`.
    #[error("ANALYSER_STORE_TYPE=local requires ANALYSER_STORE_PATH to be set")]
    MissingStorePath,
    /// `ANALYSER_STORE_PATH` was set but empty.
    #[error("ANALYSER_STORE_PATH must not be empty")]
    EmptyStorePath,
}

impl ArtifactStoreConfig {
    /// The default backend when `ANALYSER_STORE_TYPE` is unset: in-memory.
    pub const DEFAULT: Self = Self::Memory;

    /// Resolves configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `ANALYSER_STORE_TYPE` names an unknown
    /// backend, or when `local` is selected without a non-empty
    /// `ANALYSER_STORE_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_values(std::env::var("ANALYSER_STORE_TYPE").ok(), std::env::var("ANALYSER_STORE_PATH").ok())
    }

    /// Resolves configuration from already-read environment values, so
    /// callers can test without mutating the process environment.
    ///
    /// # Errors
    ///
    /// See [`ArtifactStoreConfig::from_env`].
    pub fn from_values(store_type: Option<String>, store_path: Option<String>) -> Result<Self, ConfigError> {
        match store_type.as_deref() {
            None => Ok(Self::DEFAULT),
            Some("memory") => Ok(Self::Memory),
            Some("local") => match store_path {
                None => Err(ConfigError::MissingStorePath),
                Some(path) if path.is_empty() => Err(ConfigError::EmptyStorePath),
                Some(path) => Ok(Self::Local { root: PathBuf::from(path) }),
            },
            Some(other) => Err(ConfigError::UnknownStoreType(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ArtifactStoreConfig;
    use super::ConfigError;

    #[test]
    fn unset_type_defaults_to_memory() {
        assert_eq!(ArtifactStoreConfig::from_values(None, None).expect("valid"), ArtifactStoreConfig::Memory);
    }

    #[test]
    fn local_without_path_is_rejected() {
        assert_eq!(
            ArtifactStoreConfig::from_values(Some("local".to_owned()), None),
            Err(ConfigError::MissingStorePath)
        );
    }

    #[test]
    fn local_with_empty_path_is_rejected() {
        assert_eq!(
            ArtifactStoreConfig::from_values(Some("local".to_owned()), Some(String::new())),
            Err(ConfigError::EmptyStorePath)
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(
            ArtifactStoreConfig::from_values(Some("s3".to_owned()), None),
            Err(ConfigError::UnknownStoreType("s3".to_owned()))
        );
    }

    #[test]
    fn local_with_path_resolves() {
        let config = ArtifactStoreConfig::from_values(Some("local".to_owned()), Some("/tmp/store".to_owned()))
            .expect("valid");
        assert_eq!(config, ArtifactStoreConfig::Local { root: "/tmp/store".into() });
    }
}
