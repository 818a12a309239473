// crates/cp-planner/src/lib.rs
// ============================================================================
// Crate: cp-planner
// Description: Composes the component registry, runbook parser, and
//              execution DAG into an immutable ExecutionPlan.
// Purpose: Validate a runbook end-to-end before any execution starts.
// Dependencies: cp-core, cp-dag, cp-registry, cp-runbook, indexmap, thiserror
// ============================================================================

//! # cp-planner
//!
//! [`Planner::plan`] / [`Planner::plan_from_dict`] implement spec.md §4.7's
//! algorithm verbatim, grounded directly on
//! `examples/original_source/libs/waivern-orchestration/src/waivern_orchestration/planner.py`'s
//! `Planner._create_plan` / `_resolve_schemas` / `_validate_fan_in_schemas`:
//! parse, build and validate the DAG, check every `inputs` reference
//! resolves, then walk the DAG in topological order accumulating
//! `(input_schema, output_schema)` per artifact exactly as the original's
//! `result: dict[str, tuple[Schema|None, Schema]]` does. The returned
//! [`ExecutionPlan`] carries no component instances, only configuration
//! (spec.md §4.7).

use std::path::Path;
use std::sync::Arc;

use cp_core::ArtifactId;
use cp_core::Runbook;
use cp_core::Schema;
use cp_core::runbook_model::ArtifactKind;
use cp_core::runbook_model::CHILD_RUNBOOK_TRANSFORM_TYPE;
use cp_dag::CycleDetectedError;
use cp_dag::ExecutionDag;
use cp_registry::ComponentRegistry;
use cp_runbook::RunbookParseError;
use indexmap::IndexMap;
use thiserror::Error;

/// Error raised by the planner before any execution starts.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// The runbook itself could not be parsed.
    #[error(transparent)]
    Parse(#[from] RunbookParseError),
    /// The artifact graph contains a cycle.
    #[error(transparent)]
    Cycle(#[from] CycleDetectedError),
    /// An `inputs` reference named an artifact not declared in the runbook.
    #[error("artifact '{artifact_id}' references non-existent artifact '{reference}'")]
    MissingArtifact {
        /// Artifact whose `inputs` contained the bad reference.
        artifact_id: ArtifactId,
        /// The undeclared artifact id that was referenced.
        reference: ArtifactId,
    },
    /// A runbook named a connector/analyser/classifier type not registered.
    #[error("component type '{component_type}' is not registered ({role})")]
    ComponentNotFound {
        /// The unregistered component type name.
        component_type: String,
        /// `"connector"`, `"analyser"`, or `"classifier"`.
        role: &'static str,
    },
    /// An `output_schema` override did not parse as `name` or `name/version`.
    #[error("invalid output_schema reference: {0}")]
    InvalidSchemaReference(#[from] cp_core::schema::InvalidSchemaVersion),
    /// A fan-in artifact's upstream artifacts produced different schemas.
    #[error(
        "artifact '{artifact_id}' has incompatible fan-in schemas: '{first_ref}' produces {first_schema}, but '{other_ref}' produces {other_schema}; all fan-in inputs must have the same schema"
    )]
    SchemaCompatibility {
        /// The fan-in artifact whose inputs disagree.
        artifact_id: ArtifactId,
        /// The first upstream artifact id, establishing the expected schema.
        first_ref: ArtifactId,
        /// The expected schema, as produced by `first_ref`.
        first_schema: Schema,
        /// The upstream artifact id whose schema disagreed.
        other_ref: ArtifactId,
        /// The schema `other_ref` actually produced.
        other_schema: Schema,
    },
    /// A derived artifact declared an empty `inputs` list.
    #[error("artifact '{0}' is derived but declares no inputs")]
    EmptyInputs(ArtifactId),
}

/// Immutable, validated plan produced by [`Planner::plan`] /
/// [`Planner::plan_from_dict`].
///
/// Contains everything the executor needs to run the runbook: the parsed
/// [`Runbook`], the [`ExecutionDag`] for dependency ordering, and every
/// artifact's resolved `(input_schema, output_schema)` pair. Source
/// artifacts have `input_schema = None`.
#[derive(Clone)]
pub struct ExecutionPlan {
    runbook: Runbook,
    dag: ExecutionDag,
    artifact_schemas: IndexMap<ArtifactId, (Option<Schema>, Schema)>,
}

impl ExecutionPlan {
    /// Returns the parsed runbook this plan was built from.
    #[must_use]
    pub fn runbook(&self) -> &Runbook {
        &self.runbook
    }

    /// Returns an independent clone of this plan, for handing to a child
    /// runbook's own execution (spec.md §4.9): a plan carries no component
    /// instances, so cloning it just gives the child run its own handle to
    /// the same configuration.
    #[must_use]
    pub fn clone_shell(&self) -> Self {
        self.clone()
    }

    /// Returns the execution DAG this plan was built from.
    #[must_use]
    pub fn dag(&self) -> &ExecutionDag {
        &self.dag
    }

    /// Returns the resolved `(input_schema, output_schema)` pair for `id`,
    /// if `id` was part of this plan.
    #[must_use]
    pub fn schemas_for(&self, id: &ArtifactId) -> Option<&(Option<Schema>, Schema)> {
        self.artifact_schemas.get(id)
    }

    /// Returns every artifact id in this plan's declaration order.
    #[must_use]
    pub fn artifact_ids(&self) -> impl Iterator<Item = &ArtifactId> {
        self.runbook.artifacts.keys()
    }
}

/// Plans runbook execution by validating and resolving all dependencies
/// upfront, against a shared [`ComponentRegistry`].
pub struct Planner {
    registry: Arc<ComponentRegistry>,
}

impl Planner {
    /// Builds a planner bound to `registry`.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    /// Plans execution from a runbook file on disk.
    ///
    /// # Errors
    ///
    /// See [`PlannerError`].
    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub fn plan(&self, path: &Path) -> Result<ExecutionPlan, PlannerError> {
        let runbook = cp_runbook::parse(path)?;
        self.plan_runbook(runbook)
    }

    /// Plans execution from a runbook dictionary, skipping environment
    /// variable substitution. Useful for tests and programmatic runbook
    /// construction.
    ///
    /// # Errors
    ///
    /// See [`PlannerError`].
    pub fn plan_from_dict(&self, value: serde_json::Value) -> Result<ExecutionPlan, PlannerError> {
        let runbook = cp_runbook::parse_from_dict(value)?;
        self.plan_runbook(runbook)
    }

    /// Plans execution from an already-parsed [`Runbook`].
    ///
    /// # Errors
    ///
    /// See [`PlannerError`]: [`PlannerError::Cycle`],
    /// [`PlannerError::MissingArtifact`], [`PlannerError::ComponentNotFound`],
    /// [`PlannerError::SchemaCompatibility`].
    #[tracing::instrument(skip(self, runbook), fields(runbook = %runbook.name))]
    pub fn plan_runbook(&self, runbook: Runbook) -> Result<ExecutionPlan, PlannerError> {
        let dag = ExecutionDag::build(&runbook);
        dag.validate()?;
        self.validate_refs(&runbook)?;
        let artifact_schemas = self.resolve_schemas(&runbook, &dag)?;
        Ok(ExecutionPlan { runbook, dag, artifact_schemas })
    }

    fn validate_refs(&self, runbook: &Runbook) -> Result<(), PlannerError> {
        for (artifact_id, definition) in &runbook.artifacts {
            for reference in definition.inputs() {
                if !runbook.artifacts.contains_key(reference) {
                    return Err(PlannerError::MissingArtifact { artifact_id: artifact_id.clone(), reference: reference.clone() });
                }
            }
        }
        Ok(())
    }

    fn resolve_schemas(
        &self,
        runbook: &Runbook,
        dag: &ExecutionDag,
    ) -> Result<IndexMap<ArtifactId, (Option<Schema>, Schema)>, PlannerError> {
        let mut resolved: IndexMap<ArtifactId, (Option<Schema>, Schema)> = IndexMap::with_capacity(runbook.artifacts.len());
        let mut sorter = dag.create_sorter();
        while !sorter.is_exhausted() {
            for artifact_id in sorter.get_ready() {
                let definition = &runbook.artifacts[&artifact_id];
                let schemas = match &definition.kind {
                    ArtifactKind::Source { source } => {
                        let output = self.resolve_source_schema(&source.component_type, definition.output_schema.as_deref())?;
                        (None, output)
                    }
                    ArtifactKind::Derived { inputs, transform } => {
                        self.resolve_derived_schema(&artifact_id, inputs, transform.as_ref(), definition.output_schema.as_deref(), &resolved)?
                    }
                };
                resolved.insert(artifact_id.clone(), schemas);
                sorter.mark_done(&artifact_id);
            }
        }
        Ok(resolved)
    }

    fn resolve_source_schema(&self, connector_type: &cp_core::ComponentType, output_schema: Option<&str>) -> Result<Schema, PlannerError> {
        let factory = self
            .registry
            .connector(connector_type.as_str())
            .ok_or_else(|| PlannerError::ComponentNotFound { component_type: connector_type.to_string(), role: "connector" })?;
        match output_schema {
            Some(reference) => Ok(Schema::parse_reference(reference)?),
            None => first_output_schema(&factory.supported_output_schemas(), connector_type.as_str(), "connector"),
        }
    }

    fn resolve_derived_schema(
        &self,
        artifact_id: &ArtifactId,
        inputs: &[ArtifactId],
        transform: Option<&cp_core::runbook_model::ComponentSpec>,
        output_schema: Option<&str>,
        resolved: &IndexMap<ArtifactId, (Option<Schema>, Schema)>,
    ) -> Result<(Option<Schema>, Schema), PlannerError> {
        let input_schema = self.validate_fan_in_schemas(artifact_id, inputs, resolved)?;

        let output = if let Some(reference) = output_schema {
            Schema::parse_reference(reference)?
        } else if let Some(transform) = transform {
            if transform.component_type.as_str() == CHILD_RUNBOOK_TRANSFORM_TYPE {
                // A nested runbook's own output schema is only known once it
                // executes; the planner cannot look it up in the registry
                // (child-runbook transforms are never registered there). In
                // the absence of an explicit `output_schema` override, the
                // parent artifact is treated as pass-through of its input.
                input_schema.clone()
            } else {
                let factory = self.registry.transform(transform.component_type.as_str()).ok_or_else(|| PlannerError::ComponentNotFound {
                    component_type: transform.component_type.to_string(),
                    role: "analyser/classifier",
                })?;
                first_output_schema(&factory.supported_output_schemas(), transform.component_type.as_str(), "analyser/classifier")?
            }
        } else {
            input_schema.clone()
        };

        Ok((Some(input_schema), output))
    }

    fn validate_fan_in_schemas(
        &self,
        artifact_id: &ArtifactId,
        inputs: &[ArtifactId],
        resolved: &IndexMap<ArtifactId, (Option<Schema>, Schema)>,
    ) -> Result<Schema, PlannerError> {
        let (first_ref, rest) =
            inputs.split_first().ok_or_else(|| PlannerError::EmptyInputs(artifact_id.clone()))?;
        let first_schema = resolved[first_ref].1.clone();
        for other_ref in rest {
            let other_schema = resolved[other_ref].1.clone();
            if other_schema != first_schema {
                return Err(PlannerError::SchemaCompatibility {
                    artifact_id: artifact_id.clone(),
                    first_ref: first_ref.clone(),
                    first_schema,
                    other_ref: other_ref.clone(),
                    other_schema,
                });
            }
        }
        Ok(first_schema)
    }
}

fn first_output_schema(schemas: &[Schema], component_type: &str, role: &'static str) -> Result<Schema, PlannerError> {
    schemas.first().cloned().ok_or(PlannerError::ComponentNotFound { component_type: component_type.to_owned(), role })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use cp_core::ComponentConfig;
    use cp_core::Connector;
    use cp_core::ConnectorFactory;
    use cp_core::Message;
    use cp_core::Schema;
    use cp_core::SchemaVersion;
    use cp_core::ServiceContext;
    use cp_core::error::ComponentError;
    use cp_core::error::ConnectorExtractionError;
    use cp_registry::ComponentRegistry;

    use super::Planner;
    use super::PlannerError;

    struct StubConnector;

    #[async_trait]
    impl Connector for StubConnector {
        async fn extract(&self, _output_schema: &Schema) -> Result<Message, ConnectorExtractionError> {
            unimplemented!("not exercised by planner tests")
        }
    }

    struct StubConnectorFactory {
        name: &'static str,
        schema: Schema,
    }

    impl ConnectorFactory for StubConnectorFactory {
        fn component_name(&self) -> &str {
            self.name
        }

        fn supported_output_schemas(&self) -> Vec<Schema> {
            vec![self.schema.clone()]
        }

        fn can_create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> bool {
            true
        }

        fn create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> Result<Box<dyn Connector>, ComponentError> {
            Ok(Box::new(StubConnector))
        }
    }

    fn registry_with(name: &'static str, schema: Schema) -> Arc<ComponentRegistry> {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register_connector(Arc::new(StubConnectorFactory { name, schema })).expect("registers");
        registry
    }

    #[test]
    fn linear_pipeline_plans_successfully() {
        let registry = registry_with("fs", Schema::new("standard_input", SchemaVersion::DEFAULT));
        let planner = Planner::new(registry);
        let value = serde_json::json!({
            "name": "t", "description": "t",
            "artifacts": {
                "a": {"source": {"type": "fs", "properties": {}}},
                "b": {"inputs": "a"},
                "c": {"inputs": "b", "output": true},
            }
        });
        let plan = planner.plan_from_dict(value).expect("plans");
        assert_eq!(plan.artifact_ids().count(), 3);
    }

    #[test]
    fn fan_in_schema_mismatch_is_rejected_at_plan_time() {
        let registry = Arc::new(ComponentRegistry::new());
        registry
            .register_connector(Arc::new(StubConnectorFactory { name: "a_src", schema: Schema::new("one", SchemaVersion::DEFAULT) }))
            .expect("registers");
        registry
            .register_connector(Arc::new(StubConnectorFactory { name: "b_src", schema: Schema::new("two", SchemaVersion::DEFAULT) }))
            .expect("registers");
        let planner = Planner::new(registry);
        let value = serde_json::json!({
            "name": "t", "description": "t",
            "artifacts": {
                "a": {"source": {"type": "a_src", "properties": {}}},
                "b": {"source": {"type": "b_src", "properties": {}}},
                "c": {"inputs": ["a", "b"]},
            }
        });
        let err = planner.plan_from_dict(value).expect_err("mismatch");
        assert!(matches!(err, PlannerError::SchemaCompatibility { .. }));
    }

    #[test]
    fn empty_inputs_is_rejected_instead_of_panicking() {
        let planner = Planner::new(Arc::new(ComponentRegistry::new()));
        let value = serde_json::json!({
            "name": "t", "description": "t",
            "artifacts": {"a": {"inputs": []}}
        });
        let err = planner.plan_from_dict(value).expect_err("empty inputs");
        assert!(matches!(err, PlannerError::EmptyInputs(id) if id.as_str() == "a"));
    }

    #[test]
    fn cycle_is_rejected_at_plan_time() {
        let planner = Planner::new(Arc::new(ComponentRegistry::new()));
        let value = serde_json::json!({
            "name": "t", "description": "t",
            "artifacts": {"a": {"inputs": "b"}, "b": {"inputs": "a"}}
        });
        assert!(matches!(planner.plan_from_dict(value), Err(PlannerError::Cycle(_))));
    }

    #[test]
    fn missing_reference_is_rejected_at_plan_time() {
        let planner = Planner::new(Arc::new(ComponentRegistry::new()));
        let value = serde_json::json!({
            "name": "t", "description": "t",
            "artifacts": {"a": {"inputs": "nonexistent"}}
        });
        assert!(matches!(planner.plan_from_dict(value), Err(PlannerError::MissingArtifact { .. })));
    }

    #[test]
    fn unknown_connector_type_is_rejected() {
        let planner = Planner::new(Arc::new(ComponentRegistry::new()));
        let value = serde_json::json!({
            "name": "t", "description": "t",
            "artifacts": {"a": {"source": {"type": "unregistered", "properties": {}}}}
        });
        assert!(matches!(planner.plan_from_dict(value), Err(PlannerError::ComponentNotFound { .. })));
    }
}
