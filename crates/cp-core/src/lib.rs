// crates/cp-core/src/lib.rs
// ============================================================================
// Crate: cp-core
// Description: Domain model, identifiers, and trait contracts shared by every
//              other crate in the compliance runbook orchestration engine.
// ============================================================================

//! # cp-core
//!
//! The foundation crate of the compliance runbook orchestrator. It defines:
//!
//! - [`identifiers`] — opaque, validated identifiers (`RunId`, `ArtifactId`,
//!   `SchemaName`, `ComponentType`).
//! - [`schema`] — `Schema`, the `(name, version)` identity shared across
//!   producer and consumer artifacts.
//! - [`runbook_model`] — the parsed-but-unplanned `Runbook` structure.
//! - [`message`] — `Message`, the envelope carried between components.
//! - [`state`] — `ExecutionState` and `RunMetadata`, the two persisted
//!   per-run records.
//! - [`contracts`] — trait contracts for connectors, transforms, their
//!   factories, and the artifact store.
//! - [`error`] — error types owned by the contracts defined here.
//! - [`config`] — artifact store backend configuration.
//! - [`schema_registry`] — process-wide cache resolving a [`schema::Schema`]
//!   identity to its JSON body.
//! - [`ruleset`] — process-wide typed registry of rule packages.
//!
//! No other crate in the workspace depends on anything outside this crate's
//! public API to describe "what a run is" or "what a component looks like".

pub mod config;
pub mod contracts;
pub mod error;
pub mod identifiers;
pub mod message;
pub mod runbook_model;
pub mod ruleset;
pub mod schema;
pub mod schema_registry;
pub mod state;

pub use config::ArtifactStoreConfig;
pub use config::ConfigError;
pub use contracts::ArtifactStore;
pub use contracts::Connector;
pub use contracts::ConnectorFactory;
pub use contracts::ComponentConfig;
pub use contracts::InputRequirementGroup;
pub use contracts::ServiceContext;
pub use contracts::Transform;
pub use contracts::TransformFactory;
pub use identifiers::ArtifactId;
pub use identifiers::ComponentType;
pub use identifiers::InvalidArtifactId;
pub use identifiers::RunId;
pub use identifiers::SchemaName;
pub use message::ExecutionContext;
pub use message::ExecutionStatus;
pub use message::Message;
pub use message::MessageExtensions;
pub use runbook_model::ArtifactDefinition;
pub use runbook_model::ArtifactKind;
pub use runbook_model::ComponentSpec;
pub use runbook_model::Runbook;
pub use runbook_model::RunbookStructureError;
pub use runbook_model::CHILD_RUNBOOK_TRANSFORM_TYPE;
pub use schema::Schema;
pub use schema::SchemaVersion;
pub use state::ExecutionState;
pub use state::RunMetadata;
pub use state::RunStatus;
