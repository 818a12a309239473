// crates/cp-components/src/lib.rs
// ============================================================================
// Crate: cp-components
// Description: Generic, domain-agnostic built-in connectors and transforms.
// Purpose: Give the component registry zero-config components and exercise
//          the connector/transform contracts end to end.
// Dependencies: cp-core, cp-registry, async-trait, serde_json, thiserror,
//               time, tracing
// ============================================================================

//! # cp-components
//!
//! Built-in [`cp_core::ConnectorFactory`]/[`cp_core::TransformFactory`]
//! implementations. None of these know anything about compliance findings,
//! personal data, or jurisdictions — that pattern-matching and
//! classification logic is explicitly out of scope (spec.md's Non-goals
//! name "the specific pattern-matching logic of individual analysers" and
//! "connector implementations for specific data sources"). What remains is
//! generic infrastructure, the same role `decision-gate-providers`' built-in
//! `time`/`env`/`json`/`http` providers play for that crate: a `file`
//! connector that reads local text, an `env` connector that snapshots
//! selected environment variables, and a `passthrough` transform that
//! relabels a message's schema without touching its content.
//!
//! [`register_builtins`] wires all three into a fresh [`ComponentRegistry`].

pub mod env;
pub mod file;
pub mod passthrough;

pub use env::EnvConnectorFactory;
pub use file::FileConnectorFactory;
pub use passthrough::PassThroughTransformFactory;

use std::sync::Arc;

use cp_registry::ComponentRegistry;
use cp_registry::RegistryError;

/// Registers every built-in component with `registry`.
///
/// # Errors
///
/// Returns [`RegistryError::AlreadyRegistered`] if `registry` already has a
/// connector or transform registered under one of the built-in names
/// (`"file"`, `"env"`, `"passthrough"`).
pub fn register_builtins(registry: &ComponentRegistry) -> Result<(), RegistryError> {
    registry.register_connector(Arc::new(FileConnectorFactory))?;
    registry.register_connector(Arc::new(EnvConnectorFactory))?;
    registry.register_analyser(Arc::new(PassThroughTransformFactory))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::register_builtins;
    use cp_registry::ComponentRegistry;

    #[test]
    fn builtins_register_under_their_declared_names() {
        let registry = ComponentRegistry::new();
        register_builtins(&registry).expect("registers");
        assert_eq!(registry.list_connectors(), vec!["env".to_owned(), "file".to_owned()]);
        assert_eq!(registry.list_analysers(), vec!["passthrough".to_owned()]);
    }
}
