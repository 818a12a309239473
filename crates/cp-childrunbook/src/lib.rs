// crates/cp-childrunbook/src/lib.rs
// ============================================================================
// Crate: cp-childrunbook
// Description: Resolves, sandboxes, plans, and imports the output of a
//              nested runbook referenced by a `transform.type: "runbook"`
//              artifact.
// Purpose: Let one artifact's value come from executing an entire other
//          runbook to completion, without that nested run ever reading
//          outside its declared search roots.
// Dependencies: async-trait, cap-primitives, cap-std, cp-core, cp-planner,
//               cp-runbook, thiserror, tracing
// ============================================================================

//! # cp-childrunbook
//!
//! [`resolve_child_runbook_path`] implements spec.md §4.9's path-resolution
//! security model, grounded directly on
//! `examples/original_source/libs/waivern-orchestration/tests/waivern_orchestration/test_path_resolution.py`'s
//! `resolve_child_runbook_path`: the parent runbook's own directory is
//! searched first, then `template_paths` in declared order; an absolute
//! path or any `..` component is rejected before any filesystem access is
//! attempted.
//!
//! [`ChildRunbookResolver`] wraps that resolution with a sandboxed read
//! (`cap-std`'s `Dir::open_ambient_dir`, the same crate
//! `decision-gate-contract::contract` uses to confine filesystem writes,
//! reused here to confine a read), delegates planning to [`cp_planner::Planner`],
//! and delegates actual execution to an injected [`ChildRunner`] — avoiding a
//! cyclic crate dependency on `cp-executor`, which implements `ChildRunner`
//! for its own scheduler (see `DESIGN.md`).

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use cp_core::ArtifactId;
use cp_core::ComponentSpec;
use cp_core::ExecutionState;
use cp_core::Message;
use cp_core::RunId;
use cp_core::Schema;
use cp_planner::ExecutionPlan;
use cp_planner::Planner;
use cp_planner::PlannerError;
use cp_runbook::RunbookParseError;
use thiserror::Error;

/// Error raised while resolving, reading, planning, or importing a child
/// runbook.
#[derive(Debug, Error)]
pub enum ChildRunbookError {
    /// A `transform.type: "runbook"` artifact omitted its required `path`
    /// property, or `path` was not a string.
    #[error("transform for artifact '{artifact_id}' is missing a string 'path' property")]
    MissingPathProperty {
        /// Artifact whose transform configuration was incomplete.
        artifact_id: ArtifactId,
    },
    /// The declared path failed a security check before any filesystem
    /// access was attempted.
    #[error("child runbook path '{path}' is invalid: {reason}")]
    InvalidPath {
        /// The path string as declared in the runbook.
        path: String,
        /// Human-readable reason, always containing `"absolute"` or `".."`
        /// to match the failure it names.
        reason: &'static str,
    },
    /// The declared path did not exist under the parent directory or any
    /// configured template path.
    #[error("child runbook '{path}' was not found in the parent directory or any of {searched} template path(s)")]
    NotFound {
        /// The path string as declared in the runbook.
        path: String,
        /// Number of template paths that were searched.
        searched: usize,
    },
    /// The sandboxed filesystem read failed.
    #[error("could not read child runbook: {0}")]
    Io(#[source] std::io::Error),
    /// The child runbook's contents were not valid YAML or violated a
    /// structural invariant.
    #[error(transparent)]
    Parse(#[from] RunbookParseError),
    /// The child runbook failed planning.
    #[error(transparent)]
    Plan(#[from] PlannerError),
    /// The child run itself failed to execute (delegated to the injected
    /// [`ChildRunner`]).
    #[error("child run failed: {0}")]
    Execution(String),
}

/// Resolves a declared child-runbook `path` against the parent runbook's own
/// directory, then `template_paths` in declared order.
///
/// # Errors
///
/// Returns [`ChildRunbookError::InvalidPath`] when `path` is absolute or
/// contains a `..` component, and [`ChildRunbookError::NotFound`] when no
/// candidate root contains it.
pub fn resolve_child_runbook_path(
    path: &str,
    parent_runbook_path: &Path,
    template_paths: &[String],
) -> Result<PathBuf, ChildRunbookError> {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Err(ChildRunbookError::InvalidPath { path: path.to_owned(), reason: "absolute paths are not allowed" });
    }
    if candidate.components().any(|component| matches!(component, Component::ParentDir)) {
        return Err(ChildRunbookError::InvalidPath {
            path: path.to_owned(),
            reason: "parent directory traversal ('..') is not allowed",
        });
    }

    let parent_dir = parent_runbook_path.parent().unwrap_or_else(|| Path::new("."));
    let roots = std::iter::once(parent_dir).chain(template_paths.iter().map(AsRef::as_ref));
    for root in roots {
        let resolved = root.join(candidate);
        if resolved.exists() {
            return Ok(resolved);
        }
    }
    Err(ChildRunbookError::NotFound { path: path.to_owned(), searched: template_paths.len() })
}

/// Reads `relative` from within `root`, confined by `cap-std` so the read
/// cannot escape `root` even via a symlink planted inside it.
///
/// # Errors
///
/// Returns [`ChildRunbookError::Io`] when `root` cannot be opened as a
/// capability or `relative` cannot be opened/read within it.
fn read_sandboxed(root: &Path, relative: &Path) -> Result<String, ChildRunbookError> {
    let dir = Dir::open_ambient_dir(root, ambient_authority()).map_err(ChildRunbookError::Io)?;
    let mut file = dir.open(relative).map_err(ChildRunbookError::Io)?;
    let mut text = String::new();
    std::io::Read::read_to_string(&mut file, &mut text).map_err(ChildRunbookError::Io)?;
    Ok(text)
}

/// Executes an already-planned child runbook to completion.
///
/// Implemented by the executor's scheduler; defined here (rather than
/// depending on `cp-executor` directly) so `cp-childrunbook` never depends
/// on the crate that depends on it.
#[async_trait]
pub trait ChildRunner: Send + Sync {
    /// Runs `plan` under a freshly generated `run_id`, to completion.
    /// `runbook_path` is the resolved path the child runbook was read from,
    /// so a further-nested `transform.type: "runbook"` artifact inside this
    /// child resolves relative to the child's own directory rather than the
    /// top-level parent's.
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure description; the resolver wraps it
    /// in [`ChildRunbookError::Execution`].
    async fn run_child(&self, plan: ExecutionPlan, run_id: RunId, runbook_path: &Path) -> Result<ExecutionState, String>;

    /// Loads the persisted message for `artifact_id` in `run_id`, after
    /// [`ChildRunner::run_child`] has completed for that run.
    ///
    /// # Errors
    ///
    /// Returns a human-readable failure description.
    async fn load_output(&self, run_id: RunId, artifact_id: &ArtifactId) -> Result<Message, String>;
}

/// Resolves, plans, executes, and imports a nested runbook as a single
/// derived artifact's value.
pub struct ChildRunbookResolver {
    planner: Planner,
    runner: std::sync::Arc<dyn ChildRunner>,
}

impl ChildRunbookResolver {
    /// Builds a resolver that plans child runbooks against `planner`'s
    /// registry and delegates their execution to `runner`.
    #[must_use]
    pub fn new(planner: Planner, runner: std::sync::Arc<dyn ChildRunner>) -> Self {
        Self { planner, runner }
    }

    /// Resolves and imports the child runbook named by `transform`,
    /// producing the single [`Message`] the parent artifact `artifact_id`
    /// contributes to its own run.
    ///
    /// Mirrors [`cp_core::Transform::process`]'s shape: inputs are implicit
    /// (the child runbook has its own sources), and `output_schema` is the
    /// schema the parent's plan already resolved for this artifact.
    ///
    /// # Errors
    ///
    /// See [`ChildRunbookError`].
    #[tracing::instrument(skip(self, transform, output_schema), fields(%artifact_id))]
    pub async fn resolve(
        &self,
        parent_runbook_path: &Path,
        artifact_id: &ArtifactId,
        transform: &ComponentSpec,
        parent_run_id: RunId,
        output_schema: &Schema,
    ) -> Result<Message, ChildRunbookError> {
        let path = transform
            .properties
            .get("path")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ChildRunbookError::MissingPathProperty { artifact_id: artifact_id.clone() })?;
        let template_paths: Vec<String> = transform
            .properties
            .get("template_paths")
            .and_then(serde_json::Value::as_array)
            .map(|values| values.iter().filter_map(serde_json::Value::as_str).map(str::to_owned).collect())
            .unwrap_or_default();

        let resolved_path = resolve_child_runbook_path(path, parent_runbook_path, &template_paths)?;
        let root = resolved_path.parent().unwrap_or_else(|| Path::new("."));
        let file_name = resolved_path.file_name().map_or_else(|| PathBuf::from(&resolved_path), PathBuf::from);
        let text = read_sandboxed(root, &file_name)?;
        let child_runbook = cp_runbook::parse_str(&text, &resolved_path.display().to_string())?;
        let child_name = child_runbook.name.clone();

        let plan = self.planner.plan_runbook(child_runbook)?;
        let child_run_id = RunId::generate();
        self.runner
            .run_child(plan.clone_shell(), child_run_id, &resolved_path)
            .await
            .map_err(ChildRunbookError::Execution)?;

        let outputs = self.collect_outputs(&plan, child_run_id).await?;
        let now = time::OffsetDateTime::now_utc();
        Ok(Message {
            id: artifact_id.to_string(),
            content: serde_json::Value::Object(outputs),
            schema: output_schema.clone(),
            run_id: parent_run_id,
            source: Some(format!("child:{child_name}")),
            timestamp: now,
            context: None,
            extensions: cp_core::MessageExtensions {
                execution: cp_core::ExecutionContext::success(0.0).with_child_origin(&child_name, artifact_id.to_string()),
            },
        })
    }

    async fn collect_outputs(
        &self,
        plan: &ExecutionPlan,
        child_run_id: RunId,
    ) -> Result<serde_json::Map<String, serde_json::Value>, ChildRunbookError> {
        let mut outputs = serde_json::Map::new();
        for id in plan.artifact_ids() {
            if plan.runbook().artifacts[id].output {
                let message = self.runner.load_output(child_run_id, id).await.map_err(ChildRunbookError::Execution)?;
                outputs.insert(id.to_string(), message.content);
            }
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::resolve_child_runbook_path;

    #[test]
    fn resolves_relative_to_parent_directory() {
        let dir = tempdir().expect("tmp dir");
        let parent_dir = dir.path().join("runbooks");
        std::fs::create_dir(&parent_dir).expect("mkdir");
        let parent_runbook = parent_dir.join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");
        let child_runbook = parent_dir.join("child.yaml");
        std::fs::write(&child_runbook, "").expect("touch");

        let result = resolve_child_runbook_path("./child.yaml", &parent_runbook, &[]).expect("resolves");
        assert_eq!(result, child_runbook);
        assert!(result.is_absolute());
    }

    #[test]
    fn resolves_in_subdirectory() {
        let dir = tempdir().expect("tmp dir");
        let parent_dir = dir.path().join("runbooks");
        std::fs::create_dir(&parent_dir).expect("mkdir");
        let parent_runbook = parent_dir.join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");
        let child_dir = parent_dir.join("children");
        std::fs::create_dir(&child_dir).expect("mkdir");
        let child_runbook = child_dir.join("child.yaml");
        std::fs::write(&child_runbook, "").expect("touch");

        let result = resolve_child_runbook_path("./children/child.yaml", &parent_runbook, &[]).expect("resolves");
        assert_eq!(result, child_runbook);
    }

    #[test]
    fn falls_back_to_template_paths() {
        let dir = tempdir().expect("tmp dir");
        let parent_dir = dir.path().join("runbooks");
        std::fs::create_dir(&parent_dir).expect("mkdir");
        let parent_runbook = parent_dir.join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");
        let template_dir = dir.path().join("templates");
        std::fs::create_dir(&template_dir).expect("mkdir");
        let child_runbook = template_dir.join("shared_child.yaml");
        std::fs::write(&child_runbook, "").expect("touch");

        let result = resolve_child_runbook_path(
            "shared_child.yaml",
            &parent_runbook,
            &[template_dir.display().to_string()],
        )
        .expect("resolves");
        assert_eq!(result, child_runbook);
    }

    #[test]
    fn parent_directory_takes_precedence_over_template_paths() {
        let dir = tempdir().expect("tmp dir");
        let parent_dir = dir.path().join("runbooks");
        std::fs::create_dir(&parent_dir).expect("mkdir");
        let parent_runbook = parent_dir.join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");
        let parent_child = parent_dir.join("child.yaml");
        std::fs::write(&parent_child, "parent version").expect("write");
        let template_dir = dir.path().join("templates");
        std::fs::create_dir(&template_dir).expect("mkdir");
        let template_child = template_dir.join("child.yaml");
        std::fs::write(&template_child, "template version").expect("write");

        let result =
            resolve_child_runbook_path("child.yaml", &parent_runbook, &[template_dir.display().to_string()]).expect("resolves");
        assert_eq!(result, parent_child);
        assert_eq!(std::fs::read_to_string(result).expect("read"), "parent version");
    }

    #[test]
    fn template_paths_are_searched_in_declared_order() {
        let dir = tempdir().expect("tmp dir");
        let parent_dir = dir.path().join("runbooks");
        std::fs::create_dir(&parent_dir).expect("mkdir");
        let parent_runbook = parent_dir.join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");
        let template_1 = dir.path().join("templates_1");
        std::fs::create_dir(&template_1).expect("mkdir");
        std::fs::write(template_1.join("child.yaml"), "template 1").expect("write");
        let template_2 = dir.path().join("templates_2");
        std::fs::create_dir(&template_2).expect("mkdir");
        std::fs::write(template_2.join("child.yaml"), "template 2").expect("write");

        let result = resolve_child_runbook_path(
            "child.yaml",
            &parent_runbook,
            &[template_1.display().to_string(), template_2.display().to_string()],
        )
        .expect("resolves");
        assert_eq!(std::fs::read_to_string(result).expect("read"), "template 1");
    }

    #[test]
    fn absolute_path_is_rejected() {
        let dir = tempdir().expect("tmp dir");
        let parent_runbook = dir.path().join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");

        let err = resolve_child_runbook_path("/etc/passwd", &parent_runbook, &[]).expect_err("rejected");
        assert!(err.to_string().to_lowercase().contains("absolute"));
    }

    #[test]
    fn parent_traversal_is_rejected() {
        let dir = tempdir().expect("tmp dir");
        let parent_runbook = dir.path().join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");

        let err = resolve_child_runbook_path("../sibling/child.yaml", &parent_runbook, &[]).expect_err("rejected");
        assert!(err.to_string().contains(".."));
    }

    #[test]
    fn hidden_parent_traversal_is_rejected() {
        let dir = tempdir().expect("tmp dir");
        let parent_runbook = dir.path().join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");

        let err = resolve_child_runbook_path("./subdir/../../../etc/passwd", &parent_runbook, &[]).expect_err("rejected");
        assert!(err.to_string().contains(".."));
    }

    #[test]
    fn not_found_error_names_the_requested_path() {
        let dir = tempdir().expect("tmp dir");
        let parent_runbook = dir.path().join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");

        let err = resolve_child_runbook_path("nonexistent.yaml", &parent_runbook, &[]).expect_err("not found");
        assert!(err.to_string().contains("nonexistent.yaml"));
    }

    #[test]
    fn not_found_error_names_the_path_even_with_template_paths_configured() {
        let dir = tempdir().expect("tmp dir");
        let parent_dir = dir.path().join("runbooks");
        std::fs::create_dir(&parent_dir).expect("mkdir");
        let parent_runbook = parent_dir.join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");
        let template_dir = dir.path().join("templates");
        std::fs::create_dir(&template_dir).expect("mkdir");

        let err =
            resolve_child_runbook_path("missing.yaml", &parent_runbook, &[template_dir.display().to_string()]).expect_err("not found");
        assert!(err.to_string().contains("missing.yaml"));
    }

    struct StubConnector;

    #[async_trait::async_trait]
    impl cp_core::Connector for StubConnector {
        async fn extract(&self, _output_schema: &cp_core::Schema) -> Result<cp_core::Message, cp_core::error::ConnectorExtractionError> {
            unimplemented!("not exercised by resolver tests")
        }
    }

    struct StubConnectorFactory;

    impl cp_core::ConnectorFactory for StubConnectorFactory {
        fn component_name(&self) -> &str {
            "fs"
        }

        fn supported_output_schemas(&self) -> Vec<cp_core::Schema> {
            vec![cp_core::Schema::new("standard_input", cp_core::SchemaVersion::DEFAULT)]
        }

        fn can_create(&self, _config: &cp_core::ComponentConfig, _services: &cp_core::ServiceContext) -> bool {
            true
        }

        fn create(&self, _config: &cp_core::ComponentConfig, _services: &cp_core::ServiceContext) -> Result<Box<dyn cp_core::Connector>, cp_core::error::ComponentError> {
            Ok(Box::new(StubConnector))
        }
    }

    struct RecordingRunner {
        output: cp_core::Message,
    }

    #[async_trait::async_trait]
    impl super::ChildRunner for RecordingRunner {
        async fn run_child(
            &self,
            _plan: super::ExecutionPlan,
            _run_id: cp_core::RunId,
            _runbook_path: &Path,
        ) -> Result<cp_core::ExecutionState, String> {
            Ok(cp_core::ExecutionState::new(_run_id, time::OffsetDateTime::now_utc()))
        }

        async fn load_output(&self, _run_id: cp_core::RunId, _artifact_id: &cp_core::ArtifactId) -> Result<cp_core::Message, String> {
            Ok(self.output.clone())
        }
    }

    fn sample_output_message() -> cp_core::Message {
        cp_core::Message {
            id: "child_out".to_owned(),
            content: serde_json::json!({"finding": "ok"}),
            schema: cp_core::Schema::new("finding", cp_core::SchemaVersion::DEFAULT),
            run_id: cp_core::RunId::generate(),
            source: None,
            timestamp: time::OffsetDateTime::now_utc(),
            context: None,
            extensions: cp_core::MessageExtensions { execution: cp_core::ExecutionContext::success(0.1) },
        }
    }

    #[tokio::test]
    async fn resolve_imports_child_outputs_under_a_single_artifact() {
        let dir = tempdir().expect("tmp dir");
        let parent_runbook = dir.path().join("parent.yaml");
        std::fs::write(&parent_runbook, "").expect("touch");
        std::fs::write(
            dir.path().join("child.yaml"),
            r"
name: nested
description: nested runbook
artifacts:
  child_out:
    source: { type: fs, properties: {} }
    output: true
",
        )
        .expect("write child runbook");

        let registry = Arc::new(cp_registry::ComponentRegistry::new());
        registry.register_connector(Arc::new(StubConnectorFactory)).expect("registers");
        let planner = super::Planner::new(registry);
        let runner = Arc::new(RecordingRunner { output: sample_output_message() });
        let resolver = super::ChildRunbookResolver::new(planner, runner);

        let transform = cp_core::ComponentSpec {
            component_type: cp_core::ComponentType::new("runbook"),
            properties: serde_json::Map::from_iter([("path".to_owned(), serde_json::json!("child.yaml"))]),
        };
        let artifact_id = cp_core::ArtifactId::new("imported").expect("valid");
        let schema = cp_core::Schema::new("finding", cp_core::SchemaVersion::DEFAULT);

        let message = resolver
            .resolve(&parent_runbook, &artifact_id, &transform, cp_core::RunId::generate(), &schema)
            .await
            .expect("resolves child runbook");

        assert_eq!(message.execution_origin(), "child:nested");
        assert_eq!(message.execution_alias(), Some("imported"));
        assert_eq!(message.content["child_out"], serde_json::json!({"finding": "ok"}));
    }
}
