// crates/cp-components/src/file.rs
// ============================================================================
// Module: File Connector
// Description: Connector that reads local text file content for analysis.
// Purpose: Provide a zero-config, generic source artifact for local material.
// Dependencies: cp-core, async-trait, serde_json, tokio (via cp-core's async
//               runtime expectations; this module uses std::fs synchronously
//               off the async executor thread via tokio::task::spawn_blocking)
// ============================================================================

//! ## Overview
//! [`FileConnector`] reads a file's bytes, decodes them as UTF-8 (lossy), and
//! packages the content alongside its byte length. Grounded on
//! `original_source`'s `wct.connectors.file.connector.FileConnector`: a
//! `path` property names the file, content is read and wrapped in a message;
//! unlike the original, chunked reads and configurable encodings are left
//! out as orthogonal to the contract this crate exercises.

use std::path::PathBuf;

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

const fn default_max_bytes() -> usize {
    8 * 1024 * 1024
}

/// Configuration for [`FileConnector`], from runbook `source.properties`.
#[derive(Debug, Clone, Deserialize)]
struct FileConnectorConfig {
    /// Path of the file to read.
    path: PathBuf,
    /// Hard upper bound on the file size this connector will read.
    #[serde(default = "default_max_bytes")]
    max_bytes: u64,
}

impl FileConnectorConfig {
    fn from_properties(config: &ComponentConfig) -> Result<Self, String> {
        serde_json::from_value(serde_json::Value::Object(config.clone())).map_err(|error| error.to_string())
    }
}

/// Reads one local file's content as a source artifact.
pub struct FileConnector {
    config: FileConnectorConfig,
}

#[async_trait]
impl Connector for FileConnector {
    #[tracing::instrument(skip(self), fields(path = %self.config.path.display()))]
    async fn extract(&self, output_schema: &Schema) -> Result<Message, ConnectorExtractionError> {
        let metadata = tokio::fs::metadata(&self.config.path)
            .await
            .map_err(|error| ConnectorExtractionError(format!("cannot stat {}: {error}", self.config.path.display())))?;
        if metadata.len() > self.config.max_bytes {
            return Err(ConnectorExtractionError(format!(
                "file {} is {} bytes, exceeding the {}-byte limit",
                self.config.path.display(),
                metadata.len(),
                self.config.max_bytes
            )));
        }
        let bytes = tokio::fs::read(&self.config.path)
            .await
            .map_err(|error| ConnectorExtractionError(format!("cannot read {}: {error}", self.config.path.display())))?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        Ok(Message {
            id: String::new(),
            content: serde_json::json!({
                "path": self.config.path.to_string_lossy(),
                "content": content,
                "size_bytes": bytes.len(),
            }),
            schema: output_schema.clone(),
            run_id: RunId::generate(),
            source: None,
            timestamp: time::OffsetDateTime::now_utc(),
            context: None,
            extensions: MessageExtensions { execution: cp_core::ExecutionContext::pending() },
        })
    }
}

/// Factory for [`FileConnector`], registered under the type name `"file"`.
pub struct FileConnectorFactory;

impl ConnectorFactory for FileConnectorFactory {
    fn component_name(&self) -> &str {
        "file"
    }

    fn supported_output_schemas(&self) -> Vec<Schema> {
        vec![Schema::new("text_file", SchemaVersion::DEFAULT)]
    }

    fn can_create(&self, config: &ComponentConfig, _services: &ServiceContext) -> bool {
        FileConnectorConfig::from_properties(config).is_ok()
    }

    fn create(&self, config: &ComponentConfig, _services: &ServiceContext) -> Result<Box<dyn Connector>, ComponentError> {
        let config = FileConnectorConfig::from_properties(config)
            .map_err(|reason| ComponentError::InvalidConfig { component_type: self.component_name().to_owned(), reason })?;
        Ok(Box::new(FileConnector { config }))
    }
}
