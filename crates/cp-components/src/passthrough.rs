// crates/cp-components/src/passthrough.rs
// ============================================================================
// Module: Passthrough Transform
// Description: Identity transform that relabels a message's schema.
// Purpose: Let a runbook rename a schema in the data-flow graph without a
//          real analyser or classifier in the way.
// Dependencies: cp-core, async-trait, serde_json
// ============================================================================

//! ## Overview
//! [`PassThroughTransform`] forwards its single input's content unchanged,
//! stamping it with the artifact's resolved output schema. The same shape
//! already exists privately in `cp-executor`'s own test fixtures; this
//! module is the registrable, production version of it, declared against an
//! explicit configured input schema rather than a schema hardcoded for one
//! test.

use async_trait::async_trait;
use cp_core::ComponentConfig;
use cp_core::InputRequirementGroup;
use cp_core::Message;
use cp_core::Schema;
use cp_core::ServiceContext;
use cp_core::Transform;
use cp_core::TransformFactory;
use cp_core::error::AnalyserProcessingError;
use cp_core::error::ComponentError;
use serde::Deserialize;

/// Configuration for [`PassThroughTransform`], from runbook
/// `transform.properties`.
#[derive(Debug, Clone, Deserialize)]
struct PassThroughConfig {
    /// Schema reference (`"name"` or `"name/version"`) this transform
    /// accepts as its single input.
    input_schema: String,
}

impl PassThroughConfig {
    fn from_properties(config: &ComponentConfig) -> Result<Self, String> {
        serde_json::from_value(serde_json::Value::Object(config.clone())).map_err(|error| error.to_string())
    }

    fn parsed_input_schema(&self) -> Result<Schema, String> {
        Schema::parse_reference(&self.input_schema).map_err(|error| error.to_string())
    }
}

/// Forwards a single input's content unchanged under a new schema label.
pub struct PassThroughTransform;

#[async_trait]
impl Transform for PassThroughTransform {
    async fn process(&self, inputs: Vec<Message>, output_schema: &Schema) -> Result<Message, AnalyserProcessingError> {
        let mut message = inputs
            .into_iter()
            .next()
            .ok_or_else(|| AnalyserProcessingError("passthrough requires exactly one input".to_owned()))?;
        message.schema = output_schema.clone();
        Ok(message)
    }
}

/// Factory for [`PassThroughTransform`], registered as `"passthrough"`.
pub struct PassThroughTransformFactory;

impl TransformFactory for PassThroughTransformFactory {
    fn component_name(&self) -> &str {
        "passthrough"
    }

    fn input_requirements(&self) -> Vec<InputRequirementGroup> {
        Vec::new()
    }

    fn supported_output_schemas(&self) -> Vec<Schema> {
        Vec::new()
    }

    fn can_create(&self, config: &ComponentConfig, _services: &ServiceContext) -> bool {
        PassThroughConfig::from_properties(config).and_then(|config| config.parsed_input_schema()).is_ok()
    }

    fn create(&self, config: &ComponentConfig, _services: &ServiceContext) -> Result<Box<dyn Transform>, ComponentError> {
        let config = PassThroughConfig::from_properties(config)
            .map_err(|reason| ComponentError::InvalidConfig { component_type: self.component_name().to_owned(), reason })?;
        config
            .parsed_input_schema()
            .map_err(|reason| ComponentError::InvalidConfig { component_type: self.component_name().to_owned(), reason })?;
        Ok(Box::new(PassThroughTransform))
    }
}
