// crates/cp-components/src/env.rs
// ============================================================================
// Module: Environment Connector
// Description: Connector that snapshots selected process environment
//              variables into a source artifact.
// Purpose: Give runbooks a deterministic, zero-config way to ingest
//          environment-derived configuration as input material.
// Dependencies: cp-core, async-trait, serde_json
// ============================================================================

//! ## Overview
//! [`EnvConnector`] reads an explicit list of environment variable names and
//! packages their current values (or `null`, when unset) as a JSON object.
//! Grounded on `decision-gate-providers::env::EnvProvider`'s
//! allowlist-only-by-declaration posture: unlike that provider, there is no
//! ambient denylist or process-wide snapshot, since a runbook already names
//! exactly the keys it wants.

use std::collections::BTreeSet;

use async_trait::async_trait;
use cp_core::ComponentConfig;
use cp_core::Connector;
use cp_core::ConnectorFactory;
use cp_core::Message;
use cp_core::MessageExtensions;
use cp_core::RunId;
use cp_core::Schema;
use cp_core::SchemaVersion;
use cp_core::ServiceContext;
use cp_core::error::ComponentError;
use cp_core::error::ConnectorExtractionError;
use serde::Deserialize;

/// Configuration for [`EnvConnector`], from runbook `source.properties`.
#[derive(Debug, Clone, Deserialize)]
struct EnvConnectorConfig {
    /// Environment variable names to read.
    keys: BTreeSet<String>,
}

impl EnvConnectorConfig {
    fn from_properties(config: &ComponentConfig) -> Result<Self, String> {
        let config: Self =
            serde_json::from_value(serde_json::Value::Object(config.clone())).map_err(|error| error.to_string())?;
        if config.keys.is_empty() {
            return Err("keys must name at least one environment variable".to_owned());
        }
        Ok(config)
    }
}

/// Snapshots a fixed set of environment variables as a source artifact.
pub struct EnvConnector {
    config: EnvConnectorConfig,
}

#[async_trait]
impl Connector for EnvConnector {
    #[tracing::instrument(skip(self))]
    async fn extract(&self, output_schema: &Schema) -> Result<Message, ConnectorExtractionError> {
        let mut values = serde_json::Map::new();
        for key in &self.config.keys {
            let value = std::env::var(key).map_or(serde_json::Value::Null, serde_json::Value::String);
            values.insert(key.clone(), value);
        }

        Ok(Message {
            id: String::new(),
            content: serde_json::Value::Object(values),
            schema: output_schema.clone(),
            run_id: RunId::generate(),
            source: None,
            timestamp: time::OffsetDateTime::now_utc(),
            context: None,
            extensions: MessageExtensions { execution: cp_core::ExecutionContext::pending() },
        })
    }
}

/// Factory for [`EnvConnector`], registered under the type name `"env"`.
pub struct EnvConnectorFactory;

impl ConnectorFactory for EnvConnectorFactory {
    fn component_name(&self) -> &str {
        "env"
    }

    fn supported_output_schemas(&self) -> Vec<Schema> {
        vec![Schema::new("raw_env", SchemaVersion::DEFAULT)]
    }

    fn can_create(&self, config: &ComponentConfig, _services: &ServiceContext) -> bool {
        EnvConnectorConfig::from_properties(config).is_ok()
    }

    fn create(&self, config: &ComponentConfig, _services: &ServiceContext) -> Result<Box<dyn Connector>, ComponentError> {
        let config = EnvConnectorConfig::from_properties(config)
            .map_err(|reason| ComponentError::InvalidConfig { component_type: self.component_name().to_owned(), reason })?;
        Ok(Box::new(EnvConnector { config }))
    }
}

#[cfg(test)]
mod tests {
    #![allow(unsafe_code, reason = "Test mutates process env vars in a controlled scope.")]

    use cp_core::Connector as _;
    use cp_core::ConnectorFactory as _;
    use cp_core::Schema;
    use cp_core::SchemaVersion;
    use cp_core::ServiceContext;

    use super::EnvConnectorFactory;

    #[tokio::test]
    async fn reads_declared_keys_and_nulls_missing_ones() {
        // SAFETY: test sets a process-unique key before reading it back, single-threaded.
        unsafe {
            std::env::set_var("CP_COMPONENTS_TEST_KEY", "present");
        }
        let factory = EnvConnectorFactory;
        let services = ServiceContext::new();
        let config = serde_json::json!({ "keys": ["CP_COMPONENTS_TEST_KEY", "CP_COMPONENTS_MISSING_KEY"] })
            .as_object()
            .expect("object")
            .clone();
        assert!(factory.can_create(&config, &services));

        let connector = factory.create(&config, &services).expect("creates");
        let schema = Schema::new("raw_env", SchemaVersion::DEFAULT);
        let message = connector.extract(&schema).await.expect("extracts");
        assert_eq!(message.content["CP_COMPONENTS_TEST_KEY"], "present");
        assert!(message.content["CP_COMPONENTS_MISSING_KEY"].is_null());
        // SAFETY: test cleans up the key it set above, single-threaded.
        unsafe {
            std::env::remove_var("CP_COMPONENTS_TEST_KEY");
        }
    }

    #[test]
    fn empty_keys_fails_can_create() {
        let factory = EnvConnectorFactory;
        let services = ServiceContext::new();
        let config = serde_json::json!({ "keys": [] }).as_object().expect("object").clone();
        assert!(!factory.can_create(&config, &services));
    }
}
