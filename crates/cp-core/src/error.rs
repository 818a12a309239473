// crates/cp-core/src/error.rs
// ============================================================================
// Module: Core Error Taxonomy
// Description: Error types owned by the artifact store and component contracts.
// Purpose: Give every crate depending on cp-core a stable, typed error surface
//          for the boundaries defined here, rather than one shared enum.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Each error type here corresponds to one contract boundary in §4 of the
//! specification this crate implements: the artifact store, and the
//! connector/analyser/classifier component contracts. Planner-, DAG-, and
//! runbook-parser-level errors live in their owning crates.

use thiserror::Error;

use crate::identifiers::ArtifactId;
use crate::identifiers::RunId;

/// Errors raised by an [`crate::contracts::ArtifactStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No artifact payload exists for the given run/artifact pair.
    #[error("no artifact '{artifact_id}' stored for run {run_id}")]
    ArtifactNotFound {
        /// Run the lookup was scoped to.
        run_id: RunId,
        /// Artifact id that was not found.
        artifact_id: ArtifactId,
    },
    /// No execution state exists for the given run.
    #[error("no state stored for run {0}")]
    StateNotFound(RunId),
    /// No metadata exists for the given run.
    #[error("no metadata stored for run {0}")]
    MetadataNotFound(RunId),
    /// The backing store could not complete an I/O operation.
    #[error("artifact store I/O error: {0}")]
    Io(#[source] std::io::Error),
    /// A stored payload could not be deserialized back into its type.
    #[error("artifact store serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// Errors raised when a factory cannot produce a component instance.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// The supplied configuration failed validation.
    #[error("invalid configuration for component '{component_type}': {reason}")]
    InvalidConfig {
        /// Registered component type name.
        component_type: String,
        /// Human-readable validation failure.
        reason: String,
    },
    /// A service the factory depends on was not available.
    #[error("component '{component_type}' requires unavailable service '{service}'")]
    ServiceUnavailable {
        /// Registered component type name.
        component_type: String,
        /// Name of the missing service dependency.
        service: String,
    },
}

/// Error raised by a connector's `extract` operation.
#[derive(Debug, Error)]
#[error("connector extraction failed: {0}")]
pub struct ConnectorExtractionError(pub String);

/// Error raised by an analyser's or classifier's `process` operation.
#[derive(Debug, Error)]
#[error("analyser processing failed: {0}")]
pub struct AnalyserProcessingError(pub String);

/// Error raised when a [`crate::message::Message`]'s content does not
/// conform to its declared schema.
#[derive(Debug, Error)]
#[error("message for artifact '{artifact_id}' failed schema validation: {reason}")]
pub struct MessageValidationError {
    /// Artifact whose message failed validation.
    pub artifact_id: ArtifactId,
    /// Human-readable validation failure.
    pub reason: String,
}
