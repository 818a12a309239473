// crates/cp-core/src/contracts.rs
// ============================================================================
// Module: Component & Artifact Store Contracts
// Description: Trait-object-safe contracts implemented by connectors,
//              analysers, classifiers, their factories, and artifact stores.
// Purpose: Let the registry, planner, and executor depend on interfaces only.
// Dependencies: async-trait, serde_json
// ============================================================================

//! ## Overview
//! These traits are the "interface (capability set)" the specification calls
//! for in its design notes: a tagged-by-registry-slot, dynamic-dispatch
//! contract per component flavour, plus the artifact store contract that the
//! executor and recovery layer consume. Component instances are transient and
//! owned by one worker invocation; factories are long-lived singletons shared
//! behind `Arc`.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Map;
use serde_json::Value;

use crate::error::ComponentError;
use crate::error::ConnectorExtractionError;
use crate::error::AnalyserProcessingError;
use crate::error::StoreError;
use crate::identifiers::ArtifactId;
use crate::identifiers::RunId;
use crate::message::Message;
use crate::schema::Schema;
use crate::state::ExecutionState;
use crate::state::RunMetadata;

/// Component-specific configuration, as merged from runbook `properties`.
pub type ComponentConfig = Map<String, Value>;

/// A bag of infrastructure services available for injection into factories.
///
/// Services are looked up by name; the caller downcasts to the concrete
/// service type it expects. This mirrors the factory pattern's tier split
/// between long-lived infrastructure services and transient component
/// instances, without requiring every service type to be known to `cp-core`.
#[derive(Default, Clone)]
pub struct ServiceContext {
    services: BTreeMap<String, Arc<dyn Any + Send + Sync>>,
}

impl ServiceContext {
    /// Builds an empty service context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under `name`.
    pub fn insert(&mut self, name: impl Into<String>, service: Arc<dyn Any + Send + Sync>) {
        self.services.insert(name.into(), service);
    }

    /// Looks up a service by name and downcasts it to `T`.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.services.get(name)?.clone().downcast::<T>().ok()
    }

    /// Returns `true` when a service is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }
}

/// A connector instance, transient and created per artifact execution.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Produces the message this source artifact contributes to the run.
    async fn extract(&self, output_schema: &Schema) -> Result<Message, ConnectorExtractionError>;
}

/// A factory that creates [`Connector`] instances.
pub trait ConnectorFactory: Send + Sync {
    /// Registered component type name, used in runbook `source.type`.
    fn component_name(&self) -> &str;

    /// Output schemas this connector type can produce, in declared-preference
    /// order; the first is used when a source artifact omits `output_schema`.
    fn supported_output_schemas(&self) -> Vec<Schema>;

    /// Validates `config` and service availability without side effects.
    fn can_create(&self, config: &ComponentConfig, services: &ServiceContext) -> bool;

    /// Creates a transient connector instance.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] when `config` is invalid or a required
    /// service is unavailable.
    fn create(
        &self,
        config: &ComponentConfig,
        services: &ServiceContext,
    ) -> Result<Box<dyn Connector>, ComponentError>;

    /// Declarative service dependencies, by name. Empty when none are needed.
    fn service_dependencies(&self) -> Vec<String> {
        Vec::new()
    }
}

/// One AND-combination of required input schemas for an analyser/classifier.
pub type InputRequirementGroup = Vec<Schema>;

/// An analyser or classifier instance, transient and created per execution.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Produces the message this derived artifact contributes to the run,
    /// from its upstream inputs in declared fan-in order.
    async fn process(
        &self,
        inputs: Vec<Message>,
        output_schema: &Schema,
    ) -> Result<Message, AnalyserProcessingError>;
}

/// A factory that creates [`Transform`] instances (analysers or classifiers).
pub trait TransformFactory: Send + Sync {
    /// Registered component type name, used in runbook `transform.type`.
    fn component_name(&self) -> &str;

    /// Alternative AND-combinations of input schemas this transform accepts.
    /// The outer list is "or"; each inner list must all be satisfied.
    fn input_requirements(&self) -> Vec<InputRequirementGroup>;

    /// Output schemas this transform can produce, in declared-preference
    /// order; the first is used when a derived artifact omits
    /// `output_schema` and has a `transform`.
    fn supported_output_schemas(&self) -> Vec<Schema>;

    /// Validates `config` and service availability without side effects.
    fn can_create(&self, config: &ComponentConfig, services: &ServiceContext) -> bool;

    /// Creates a transient transform instance.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] when `config` is invalid or a required
    /// service is unavailable.
    fn create(
        &self,
        config: &ComponentConfig,
        services: &ServiceContext,
    ) -> Result<Box<dyn Transform>, ComponentError>;

    /// Declarative service dependencies, by name. Empty when none are needed.
    fn service_dependencies(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Async, key-addressed persistence for run state, metadata, and artifact
/// payloads.
///
/// # Invariants
/// - Writes to the same `(run_id, key)` pair are serialised by the
///   implementation; writes to distinct runs never block one another.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persists `message` under `(run_id, artifact_id)`.
    async fn put_artifact(&self, run_id: RunId, artifact_id: &ArtifactId, message: &Message) -> Result<(), StoreError>;

    /// Loads the message previously persisted under `(run_id, artifact_id)`.
    async fn get_artifact(&self, run_id: RunId, artifact_id: &ArtifactId) -> Result<Message, StoreError>;

    /// Persists `state` under the run's `state` key.
    async fn put_state(&self, run_id: RunId, state: &ExecutionState) -> Result<(), StoreError>;

    /// Loads the most recently persisted state for `run_id`.
    async fn get_state(&self, run_id: RunId) -> Result<ExecutionState, StoreError>;

    /// Persists `metadata` under the run's `metadata` key.
    async fn put_metadata(&self, run_id: RunId, metadata: &RunMetadata) -> Result<(), StoreError>;

    /// Loads the metadata previously persisted for `run_id`.
    async fn get_metadata(&self, run_id: RunId) -> Result<RunMetadata, StoreError>;

    /// Lists every run id known to the store.
    async fn list_runs(&self) -> Result<Vec<RunId>, StoreError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ServiceContext;

    #[test]
    fn service_context_round_trips_typed_lookup() {
        let mut ctx = ServiceContext::new();
        ctx.insert("greeting", Arc::new(String::from("hello")));
        let value = ctx.get::<String>("greeting").expect("registered");
        assert_eq!(*value, "hello");
        assert!(ctx.get::<u32>("greeting").is_none());
        assert!(!ctx.contains("missing"));
    }
}
