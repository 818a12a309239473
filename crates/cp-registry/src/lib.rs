// crates/cp-registry/src/lib.rs
// ============================================================================
// Crate: cp-registry
// Description: Registry of connector/analyser/classifier factories.
// Purpose: Give the planner and executor lookup-by-type-name access to
//          registered component factories without depending on a concrete
//          component implementation crate.
// Dependencies: cp-core, thiserror
// ============================================================================

//! # cp-registry
//!
//! [`ComponentRegistry`] holds three independent maps of registered
//! factories — connector, analyser, classifier — keyed by the component type
//! name a runbook's `source.type` / `transform.type` names. Grounded on
//! `decision-gate-providers::registry::ProviderRegistry`'s routing-by-identifier
//! style, generalised from one flavour of provider to three factory flavours
//! (spec.md §4.3). Registration uses an internal `RwLock`; lookups are cheap
//! `Arc` clones so factories remain long-lived singletons shared across
//! concurrent worker invocations (spec.md §5 "Shared resources").
//!
//! Analysers and classifiers share one factory flavour (`TransformFactory`)
//! since the spec draws no functional distinction between them at the
//! contract level (§4.3): both expose `input_requirements` /
//! `supported_output_schemas` / `create` / `can_create`. The registry keeps
//! them in separate maps purely so `list_analysers` / `list_classifiers`
//! (spec.md §6.2) can report them independently.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::RwLock;

use cp_core::ConnectorFactory;
use cp_core::TransformFactory;
use thiserror::Error;

/// Error returned when a component registry lookup or registration fails.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No connector factory is registered under the requested type name.
    #[error("connector type '{0}' is not registered")]
    UnknownConnector(String),
    /// No analyser factory is registered under the requested type name.
    #[error("analyser type '{0}' is not registered")]
    UnknownAnalyser(String),
    /// No classifier factory is registered under the requested type name.
    #[error("classifier type '{0}' is not registered")]
    UnknownClassifier(String),
    /// A factory is already registered under the requested type name.
    #[error("component type '{0}' is already registered")]
    AlreadyRegistered(String),
}

/// Process-wide registry of connector, analyser, and classifier factories.
///
/// # Invariants
/// - Each of the three maps has at most one factory per type name.
/// - Factories are `Arc`-shared singletons; `create` is called per execution
///   to obtain a transient component instance.
#[derive(Default)]
pub struct ComponentRegistry {
    connectors: RwLock<BTreeMap<String, Arc<dyn ConnectorFactory>>>,
    analysers: RwLock<BTreeMap<String, Arc<dyn TransformFactory>>>,
    classifiers: RwLock<BTreeMap<String, Arc<dyn TransformFactory>>>,
}

impl ComponentRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connector factory under its own declared `component_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] when the type name is
    /// already registered.
    pub fn register_connector(&self, factory: Arc<dyn ConnectorFactory>) -> Result<(), RegistryError> {
        let mut connectors = self.connectors.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let name = factory.component_name().to_owned();
        if connectors.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        connectors.insert(name, factory);
        Ok(())
    }

    /// Registers an analyser factory under its own declared `component_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] when the type name is
    /// already registered.
    pub fn register_analyser(&self, factory: Arc<dyn TransformFactory>) -> Result<(), RegistryError> {
        let mut analysers = self.analysers.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let name = factory.component_name().to_owned();
        if analysers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        analysers.insert(name, factory);
        Ok(())
    }

    /// Registers a classifier factory under its own declared `component_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyRegistered`] when the type name is
    /// already registered.
    pub fn register_classifier(&self, factory: Arc<dyn TransformFactory>) -> Result<(), RegistryError> {
        let mut classifiers = self.classifiers.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        let name = factory.component_name().to_owned();
        if classifiers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        classifiers.insert(name, factory);
        Ok(())
    }

    /// Looks up a connector factory by type name.
    #[must_use]
    pub fn connector(&self, type_name: &str) -> Option<Arc<dyn ConnectorFactory>> {
        self.connectors.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(type_name).cloned()
    }

    /// Looks up an analyser factory by type name.
    #[must_use]
    pub fn analyser(&self, type_name: &str) -> Option<Arc<dyn TransformFactory>> {
        self.analysers.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(type_name).cloned()
    }

    /// Looks up a classifier factory by type name.
    #[must_use]
    pub fn classifier(&self, type_name: &str) -> Option<Arc<dyn TransformFactory>> {
        self.classifiers.read().unwrap_or_else(std::sync::PoisonError::into_inner).get(type_name).cloned()
    }

    /// Looks up a transform factory (analyser or classifier) by type name,
    /// searching analysers first. Used by the planner and executor, which do
    /// not otherwise need to distinguish the two at the dispatch boundary.
    #[must_use]
    pub fn transform(&self, type_name: &str) -> Option<Arc<dyn TransformFactory>> {
        self.analyser(type_name).or_else(|| self.classifier(type_name))
    }

    /// Lists registered connector type names, in sorted order.
    #[must_use]
    pub fn list_connectors(&self) -> Vec<String> {
        self.connectors.read().unwrap_or_else(std::sync::PoisonError::into_inner).keys().cloned().collect()
    }

    /// Lists registered analyser type names, in sorted order.
    #[must_use]
    pub fn list_analysers(&self) -> Vec<String> {
        self.analysers.read().unwrap_or_else(std::sync::PoisonError::into_inner).keys().cloned().collect()
    }

    /// Lists registered classifier type names, in sorted order.
    #[must_use]
    pub fn list_classifiers(&self) -> Vec<String> {
        self.classifiers.read().unwrap_or_else(std::sync::PoisonError::into_inner).keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use cp_core::ComponentConfig;
    use cp_core::Connector;
    use cp_core::ConnectorFactory;
    use cp_core::error::ComponentError;
    use cp_core::error::ConnectorExtractionError;
    use cp_core::Message;
    use cp_core::Schema;
    use cp_core::SchemaVersion;
    use cp_core::ServiceContext;

    use super::ComponentRegistry;
    use super::RegistryError;

    struct NullConnector;

    #[async_trait]
    impl Connector for NullConnector {
        async fn extract(&self, _output_schema: &Schema) -> Result<Message, ConnectorExtractionError> {
            unimplemented!("not exercised by registry tests")
        }
    }

    struct NullConnectorFactory;

    impl ConnectorFactory for NullConnectorFactory {
        fn component_name(&self) -> &str {
            "null"
        }

        fn supported_output_schemas(&self) -> Vec<Schema> {
            vec![Schema::new("standard_input", SchemaVersion::DEFAULT)]
        }

        fn can_create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> bool {
            true
        }

        fn create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> Result<Box<dyn Connector>, ComponentError> {
            Ok(Box::new(NullConnector))
        }
    }

    #[test]
    fn registers_and_looks_up_connector_by_type_name() {
        let registry = ComponentRegistry::new();
        registry.register_connector(std::sync::Arc::new(NullConnectorFactory)).expect("registers");
        assert!(registry.connector("null").is_some());
        assert!(registry.connector("unknown").is_none());
        assert_eq!(registry.list_connectors(), vec!["null".to_owned()]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ComponentRegistry::new();
        registry.register_connector(std::sync::Arc::new(NullConnectorFactory)).expect("first");
        let err = registry.register_connector(std::sync::Arc::new(NullConnectorFactory)).expect_err("duplicate");
        assert!(matches!(err, RegistryError::AlreadyRegistered(name) if name == "null"));
    }
}
