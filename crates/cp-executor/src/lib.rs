// crates/cp-executor/src/lib.rs
// ============================================================================
// Crate: cp-executor
// Description: DAG-driven scheduler: dispatches ready artifacts to a bounded
//              worker pool, records outcomes, persists state, supports
//              resume, cancellation, and per-artifact timeouts.
// Purpose: Turn an ExecutionPlan into an ExecutionState.
// Dependencies: async-trait, cp-childrunbook, cp-core, cp-dag, cp-planner,
//               cp-registry, cp-runbook, thiserror, time, tokio, tracing
// ============================================================================

//! # cp-executor
//!
//! [`Executor::execute`] / [`Executor::resume`] implement spec.md §4.8's
//! dispatch loop verbatim: a single task owns the [`cp_core::ExecutionState`]
//! and a [`cp_dag::ReadySorter`]; a [`tokio::sync::Semaphore`] of size `N`
//! bounds in-flight workers; each worker is a spawned task reporting an
//! [`Outcome`] back over an `mpsc` channel the scheduler `recv().await`s on,
//! so the scheduler never busy-waits. Grounded on
//! `decision-gate-store-sqlite`'s single-writer-thread discipline (persist
//! before the next dispatch) and `decision-gate-broker`'s dispatch idiom,
//! generalised from a synchronous composite dispatcher to an async worker
//! pool.
//!
//! [`Executor`] also implements [`cp_childrunbook::ChildRunner`], so a
//! `transform.type: "runbook"` artifact's worker can recurse into a fresh
//! [`cp_childrunbook::ChildRunbookResolver`] built around a cloned `Executor`
//! (cheap: every field is `Arc`-backed) rather than a self-referential `Arc`.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use cp_childrunbook::ChildRunbookResolver;
use cp_childrunbook::ChildRunner;
use cp_core::ArtifactId;
use cp_core::ArtifactStore;
use cp_core::ExecutionContext;
use cp_core::ExecutionState;
use cp_core::Message;
use cp_core::MessageExtensions;
use cp_core::RunId;
use cp_core::Schema;
use cp_core::ServiceContext;
use cp_core::error::StoreError;
use cp_core::runbook_model::ArtifactKind;
use cp_core::runbook_model::CHILD_RUNBOOK_TRANSFORM_TYPE;
use cp_core::runbook_model::ComponentSpec;
use cp_planner::ExecutionPlan;
use cp_planner::Planner;
use cp_registry::ComponentRegistry;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;

/// Error raised by the executor's infrastructure, as distinct from a
/// per-artifact failure (which is captured inside [`ExecutionState`], never
/// returned as an `Err` here; spec.md §7 "exceptions vs results").
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The artifact store could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Cooperative cancellation flag shared between a caller and a running
/// execution. Checked by the scheduler between dispatch ticks; an in-flight
/// worker's future is dropped on cancellation rather than polled further,
/// the idiomatic Rust analogue of "ask workers to cancel cooperatively".
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Builds a fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`Cancellation::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one worker's attempt to produce an artifact's [`Message`].
struct Outcome {
    artifact_id: ArtifactId,
    result: Result<Message, String>,
    duration: Duration,
}

/// Dispatches an [`ExecutionPlan`] to a bounded worker pool against a shared
/// [`ComponentRegistry`] and [`ArtifactStore`].
///
/// Cheap to [`Clone`]: every field is `Arc`-backed or `Copy`.
#[derive(Clone)]
pub struct Executor {
    registry: Arc<ComponentRegistry>,
    store: Arc<dyn ArtifactStore>,
    services: ServiceContext,
    concurrency: NonZeroUsize,
    artifact_timeout: Option<Duration>,
}

impl Executor {
    /// Builds an executor with concurrency equal to the host's usable
    /// parallelism (falling back to 1 if it cannot be determined).
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>, store: Arc<dyn ArtifactStore>, services: ServiceContext) -> Self {
        let concurrency = std::thread::available_parallelism().unwrap_or(NonZeroUsize::MIN);
        Self { registry, store, services, concurrency, artifact_timeout: None }
    }

    /// Overrides the worker pool's bounded concurrency. `N=1` is a valid,
    /// well-defined mode (spec.md §4.8).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: NonZeroUsize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets a per-artifact timeout; an artifact still running past this
    /// duration transitions to `failed` with `"timeout after {s}s"`.
    #[must_use]
    pub fn with_artifact_timeout(mut self, timeout: Duration) -> Self {
        self.artifact_timeout = Some(timeout);
        self
    }

    /// Executes `plan` under a fresh `run_id`, to completion.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the artifact store cannot be read or
    /// written; per-artifact failures are recorded in the returned state.
    #[tracing::instrument(skip(self, plan), fields(%run_id))]
    pub async fn execute(&self, plan: &ExecutionPlan, run_id: RunId, runbook_path: &Path) -> Result<ExecutionState, ExecutorError> {
        let state = ExecutionState::new(run_id, OffsetDateTime::now_utc());
        self.run(plan, state, runbook_path, None).await
    }

    /// Executes `plan` under a fresh `run_id`, honouring `cancellation`.
    ///
    /// # Errors
    ///
    /// See [`Executor::execute`].
    pub async fn execute_cancellable(
        &self,
        plan: &ExecutionPlan,
        run_id: RunId,
        runbook_path: &Path,
        cancellation: Cancellation,
    ) -> Result<ExecutionState, ExecutorError> {
        let state = ExecutionState::new(run_id, OffsetDateTime::now_utc());
        self.run(plan, state, runbook_path, Some(cancellation)).await
    }

    /// Resumes `run_id` from its last persisted state: artifacts already in
    /// `completed`/`failed`/`skipped` are not re-run; any artifact `running`
    /// at load time is treated as `pending`, discarding its partial output
    /// (spec.md §4.8 "Resume").
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when no prior state exists for `run_id` or
    /// the store cannot be read or written.
    #[tracing::instrument(skip(self, plan), fields(%run_id))]
    pub async fn resume(&self, plan: &ExecutionPlan, run_id: RunId, runbook_path: &Path) -> Result<ExecutionState, ExecutorError> {
        let mut state = self.store.get_state(run_id).await?;
        state.reset_in_flight_for_resume(OffsetDateTime::now_utc());
        self.run(plan, state, runbook_path, None).await
    }

    async fn run(
        &self,
        plan: &ExecutionPlan,
        mut state: ExecutionState,
        runbook_path: &Path,
        cancellation: Option<Cancellation>,
    ) -> Result<ExecutionState, ExecutorError> {
        let run_id = state.run_id;
        self.store.put_state(run_id, &state).await?;

        let mut sorter = plan.dag().create_sorter();
        Self::replay_terminal(&state, &mut sorter);

        let semaphore = Arc::new(Semaphore::new(self.concurrency.get()));
        let (tx, mut rx) = mpsc::channel::<Outcome>(self.concurrency.get());
        let mut in_flight = 0usize;

        loop {
            if cancellation.as_ref().is_some_and(Cancellation::is_cancelled) {
                self.skip_remaining(plan, &mut state, &mut sorter).await?;
                break;
            }

            for artifact_id in sorter.get_ready() {
                if state.is_terminal(&artifact_id) {
                    continue;
                }
                if let Some(ancestor) = self.failed_ancestor(plan, &state, &artifact_id) {
                    state.mark_skipped(&artifact_id, format!("upstream '{ancestor}' failed"), OffsetDateTime::now_utc());
                    self.store.put_state(run_id, &state).await?;
                    sorter.mark_done(&artifact_id);
                    continue;
                }

                state.mark_running(artifact_id.clone(), OffsetDateTime::now_utc());
                self.store.put_state(run_id, &state).await?;
                in_flight += 1;
                self.spawn_worker(
                    plan,
                    artifact_id,
                    run_id,
                    runbook_path.to_path_buf(),
                    cancellation.clone(),
                    Arc::clone(&semaphore),
                    tx.clone(),
                );
            }

            if in_flight == 0 && sorter.is_exhausted() {
                break;
            }

            let Some(outcome) = rx.recv().await else { break };
            in_flight -= 1;
            self.apply_outcome(&mut state, &outcome);
            self.store.put_state(run_id, &state).await?;
            sorter.mark_done(&outcome.artifact_id);
        }

        Ok(state)
    }

    /// Seeds `sorter` with every artifact the resumed `state` already
    /// considers terminal, so its in-degree bookkeeping reflects prior
    /// progress before the dispatch loop starts. A no-op for a fresh run
    /// (`state` has no terminal artifacts yet).
    ///
    /// `mark_done` only touches in-degree counts and pushes newly-released
    /// successors; it never requires its argument to currently be "ready",
    /// so every terminal id can be replayed directly without draining
    /// `get_ready()` first. Already-terminal source artifacts stay in the
    /// sorter's initial ready set and surface once on the dispatch loop's
    /// first `get_ready()` call, where `state.is_terminal` skips them.
    fn replay_terminal(state: &ExecutionState, sorter: &mut cp_dag::ReadySorter<'_>) {
        for id in state.completed.iter().chain(state.failed.iter()).chain(state.skipped.iter()) {
            sorter.mark_done(id);
        }
    }

    fn failed_ancestor(&self, plan: &ExecutionPlan, state: &ExecutionState, artifact_id: &ArtifactId) -> Option<ArtifactId> {
        for ancestor in plan.dag().predecessors(artifact_id) {
            if state.failed.contains(&ancestor) || state.skipped.contains(&ancestor) {
                return Some(ancestor);
            }
        }
        None
    }

    async fn skip_remaining(
        &self,
        plan: &ExecutionPlan,
        state: &mut ExecutionState,
        sorter: &mut cp_dag::ReadySorter<'_>,
    ) -> Result<(), ExecutorError> {
        let mut remaining: HashSet<ArtifactId> = plan.artifact_ids().cloned().collect();
        remaining.retain(|id| !state.is_terminal(id));
        for artifact_id in remaining {
            state.mark_skipped(&artifact_id, "cancelled", OffsetDateTime::now_utc());
            sorter.mark_done(&artifact_id);
        }
        self.store.put_state(state.run_id, state).await
    }

    fn apply_outcome(&self, state: &mut ExecutionState, outcome: &Outcome) {
        let now = OffsetDateTime::now_utc();
        match &outcome.result {
            Ok(_) => {
                tracing::debug!(artifact_id = %outcome.artifact_id, duration_ms = outcome.duration.as_millis(), "artifact completed");
                state.mark_completed(&outcome.artifact_id, now);
            }
            Err(reason) => {
                tracing::warn!(artifact_id = %outcome.artifact_id, duration_ms = outcome.duration.as_millis(), %reason, "artifact failed");
                state.mark_failed(&outcome.artifact_id, reason.clone(), now);
            }
        }
    }

    #[allow(clippy::too_many_arguments, reason = "worker spawn needs every piece of per-artifact context; splitting it would scatter related state across several private structs for no clarity gain")]
    fn spawn_worker(
        &self,
        plan: &ExecutionPlan,
        artifact_id: ArtifactId,
        run_id: RunId,
        runbook_path: PathBuf,
        cancellation: Option<Cancellation>,
        semaphore: Arc<Semaphore>,
        tx: mpsc::Sender<Outcome>,
    ) {
        let executor = self.clone();
        let definition = plan.runbook().artifacts[&artifact_id].clone();
        let schemas = plan.schemas_for(&artifact_id).cloned();
        let timeout = self.artifact_timeout;
        tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_closed) => return,
            };
            let start = Instant::now();
            let work = executor.run_one(run_id, &artifact_id, &definition, schemas.as_ref(), &runbook_path, cancellation);
            let result = match timeout {
                Some(duration) => match tokio::time::timeout(duration, work).await {
                    Ok(result) => result,
                    Err(_elapsed) => Err(format!("timeout after {}s", duration.as_secs())),
                },
                None => work.await,
            };
            drop(permit);
            let outcome = Outcome { artifact_id, result, duration: start.elapsed() };
            let _ = tx.send(outcome).await;
        });
    }

    /// Runs a single artifact's component invocation: builds its config,
    /// extracts or processes depending on artifact kind, validates the
    /// resulting message against its declared schema, and persists it.
    /// Spec.md §4.8 "Worker procedure for an artifact".
    async fn run_one(
        &self,
        run_id: RunId,
        artifact_id: &ArtifactId,
        definition: &cp_core::runbook_model::ArtifactDefinition,
        schemas: Option<&(Option<Schema>, Schema)>,
        runbook_path: &Path,
        cancellation: Option<Cancellation>,
    ) -> Result<Message, String> {
        let Some((_input_schema, output_schema)) = schemas else {
            return Err(format!("artifact '{artifact_id}' has no resolved schema"));
        };

        if cancellation.as_ref().is_some_and(Cancellation::is_cancelled) {
            return Err("cancelled".to_owned());
        }

        let message = match &definition.kind {
            ArtifactKind::Source { source } => self.run_source(output_schema, source).await,
            ArtifactKind::Derived { inputs, transform } => {
                self.run_derived(run_id, artifact_id, inputs, transform.as_ref(), output_schema, runbook_path).await
            }
        }?;

        validate_message_schema(artifact_id, &message, output_schema)?;
        self.store.put_artifact(run_id, artifact_id, &message).await.map_err(|err| err.to_string())?;
        Ok(message)
    }

    async fn run_source(&self, output_schema: &Schema, source: &ComponentSpec) -> Result<Message, String> {
        let start = Instant::now();
        let factory = self
            .registry
            .connector(source.component_type.as_str())
            .ok_or_else(|| format!("connector type '{}' is not registered", source.component_type))?;
        if !factory.can_create(&source.properties, &self.services) {
            return Err(format!("connector '{}' cannot be created with the given configuration", source.component_type));
        }
        let connector = factory.create(&source.properties, &self.services).map_err(|err| err.to_string())?;
        let mut message = connector.extract(output_schema).await.map_err(|err| err.to_string())?;
        message.extensions = MessageExtensions { execution: ExecutionContext::success(start.elapsed().as_secs_f64()) };
        Ok(message)
    }

    #[allow(clippy::too_many_arguments, reason = "mirrors the artifact shape spec.md §4.8 dispatches on; inputs/transform/output_schema/runbook_path are all required to resolve a derived artifact")]
    async fn run_derived(
        &self,
        run_id: RunId,
        artifact_id: &ArtifactId,
        inputs: &[ArtifactId],
        transform: Option<&ComponentSpec>,
        output_schema: &Schema,
        runbook_path: &Path,
    ) -> Result<Message, String> {
        let start = Instant::now();
        let mut input_messages = Vec::with_capacity(inputs.len());
        for input_id in inputs {
            let message = self.store.get_artifact(run_id, input_id).await.map_err(|err| err.to_string())?;
            input_messages.push(message);
        }

        let Some(transform) = transform else {
            let mut message = input_messages.into_iter().next().ok_or_else(|| format!("artifact '{artifact_id}' has no input to pass through"))?;
            message.id = artifact_id.to_string();
            message.extensions = MessageExtensions { execution: ExecutionContext::success(start.elapsed().as_secs_f64()) };
            return Ok(message);
        };

        if transform.component_type.as_str() == CHILD_RUNBOOK_TRANSFORM_TYPE {
            return self.run_child_runbook(artifact_id, transform, run_id, output_schema, runbook_path).await;
        }

        let factory = self
            .registry
            .transform(transform.component_type.as_str())
            .ok_or_else(|| format!("analyser/classifier type '{}' is not registered", transform.component_type))?;
        if !factory.can_create(&transform.properties, &self.services) {
            return Err(format!("transform '{}' cannot be created with the given configuration", transform.component_type));
        }
        let component = factory.create(&transform.properties, &self.services).map_err(|err| err.to_string())?;
        let mut message = component.process(input_messages, output_schema).await.map_err(|err| err.to_string())?;
        message.id = artifact_id.to_string();
        message.extensions = MessageExtensions { execution: ExecutionContext::success(start.elapsed().as_secs_f64()) };
        Ok(message)
    }

    async fn run_child_runbook(
        &self,
        artifact_id: &ArtifactId,
        transform: &ComponentSpec,
        parent_run_id: RunId,
        output_schema: &Schema,
        runbook_path: &Path,
    ) -> Result<Message, String> {
        let planner = Planner::new(Arc::clone(&self.registry));
        let runner: Arc<dyn ChildRunner> = Arc::new(self.clone());
        let resolver = ChildRunbookResolver::new(planner, runner);
        resolver
            .resolve(runbook_path, artifact_id, transform, parent_run_id, output_schema)
            .await
            .map_err(|err| err.to_string())
    }
}

/// Validates that `message.schema` matches `expected`; the component
/// contract is trusted to have produced content that conforms to the schema
/// it claims, so this checks identity rather than re-validating the JSON
/// body against the schema's JSON-schema document (that belongs to the
/// schema registry's own `load` path, not the executor).
fn validate_message_schema(artifact_id: &ArtifactId, message: &Message, expected: &Schema) -> Result<(), String> {
    if &message.schema == expected {
        Ok(())
    } else {
        Err(format!("message for artifact '{artifact_id}' declared schema {} but artifact expects {expected}", message.schema))
    }
}

#[async_trait]
impl ChildRunner for Executor {
    async fn run_child(&self, plan: ExecutionPlan, run_id: RunId, runbook_path: &Path) -> Result<ExecutionState, String> {
        self.execute(&plan, run_id, runbook_path).await.map_err(|err| err.to_string())
    }

    async fn load_output(&self, run_id: RunId, artifact_id: &ArtifactId) -> Result<Message, String> {
        self.store.get_artifact(run_id, artifact_id).await.map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;
    use cp_core::ComponentConfig;
    use cp_core::Connector;
    use cp_core::ConnectorFactory;
    use cp_core::Message;
    use cp_core::MessageExtensions;
    use cp_core::Schema;
    use cp_core::SchemaVersion;
    use cp_core::ServiceContext;
    use cp_core::Transform;
    use cp_core::TransformFactory;
    use cp_core::contracts::InputRequirementGroup;
    use cp_core::error::AnalyserProcessingError;
    use cp_core::error::ComponentError;
    use cp_core::error::ConnectorExtractionError;
    use cp_registry::ComponentRegistry;
    use cp_store::InMemoryArtifactStore;

    use super::Executor;

    struct EchoConnector;

    #[async_trait]
    impl Connector for EchoConnector {
        async fn extract(&self, output_schema: &Schema) -> Result<Message, ConnectorExtractionError> {
            Ok(Message {
                id: String::new(),
                content: serde_json::json!({"ok": true}),
                schema: output_schema.clone(),
                run_id: cp_core::RunId::generate(),
                source: None,
                timestamp: time::OffsetDateTime::now_utc(),
                context: None,
                extensions: MessageExtensions { execution: cp_core::ExecutionContext::pending() },
            })
        }
    }

    struct EchoConnectorFactory;

    impl ConnectorFactory for EchoConnectorFactory {
        fn component_name(&self) -> &str {
            "echo"
        }

        fn supported_output_schemas(&self) -> Vec<Schema> {
            vec![Schema::new("standard_input", SchemaVersion::DEFAULT)]
        }

        fn can_create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> bool {
            true
        }

        fn create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> Result<Box<dyn Connector>, ComponentError> {
            Ok(Box::new(EchoConnector))
        }
    }

    struct FailingConnector;

    #[async_trait]
    impl Connector for FailingConnector {
        async fn extract(&self, _output_schema: &Schema) -> Result<Message, ConnectorExtractionError> {
            Err(ConnectorExtractionError("boom".to_owned()))
        }
    }

    struct FailingConnectorFactory;

    impl ConnectorFactory for FailingConnectorFactory {
        fn component_name(&self) -> &str {
            "failing"
        }

        fn supported_output_schemas(&self) -> Vec<Schema> {
            vec![Schema::new("standard_input", SchemaVersion::DEFAULT)]
        }

        fn can_create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> bool {
            true
        }

        fn create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> Result<Box<dyn Connector>, ComponentError> {
            Ok(Box::new(FailingConnector))
        }
    }

    struct PassThroughTransform;

    #[async_trait]
    impl Transform for PassThroughTransform {
        async fn process(&self, inputs: Vec<Message>, output_schema: &Schema) -> Result<Message, AnalyserProcessingError> {
            let mut message = inputs.into_iter().next().expect("one input");
            message.schema = output_schema.clone();
            Ok(message)
        }
    }

    struct PassThroughTransformFactory;

    impl TransformFactory for PassThroughTransformFactory {
        fn component_name(&self) -> &str {
            "passthrough"
        }

        fn input_requirements(&self) -> Vec<InputRequirementGroup> {
            vec![vec![Schema::new("standard_input", SchemaVersion::DEFAULT)]]
        }

        fn supported_output_schemas(&self) -> Vec<Schema> {
            vec![Schema::new("standard_input", SchemaVersion::DEFAULT)]
        }

        fn can_create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> bool {
            true
        }

        fn create(&self, _config: &ComponentConfig, _services: &ServiceContext) -> Result<Box<dyn Transform>, ComponentError> {
            Ok(Box::new(PassThroughTransform))
        }
    }

    fn registry() -> Arc<ComponentRegistry> {
        let registry = ComponentRegistry::new();
        registry.register_connector(Arc::new(EchoConnectorFactory)).expect("registers");
        registry.register_connector(Arc::new(FailingConnectorFactory)).expect("registers");
        registry.register_analyser(Arc::new(PassThroughTransformFactory)).expect("registers");
        Arc::new(registry)
    }

    #[tokio::test]
    async fn linear_pipeline_completes_in_declared_order() {
        let planner = cp_planner::Planner::new(registry());
        let plan = planner
            .plan_from_dict(serde_json::json!({
                "name": "t", "description": "t",
                "artifacts": {
                    "a": {"source": {"type": "echo", "properties": {}}},
                    "b": {"inputs": "a", "transform": {"type": "passthrough", "properties": {}}, "output": true},
                }
            }))
            .expect("plans");

        let store = Arc::new(InMemoryArtifactStore::new());
        let executor = Executor::new(registry(), store, ServiceContext::new());
        let run_id = cp_core::RunId::generate();
        let state = executor.execute(&plan, run_id, Path::new("runbook.yaml")).await.expect("executes");

        assert!(state.completed.contains(&cp_core::ArtifactId::new("a").expect("valid")));
        assert!(state.completed.contains(&cp_core::ArtifactId::new("b").expect("valid")));
        assert!(state.failed.is_empty());
        assert!(state.skipped.is_empty());
    }

    #[tokio::test]
    async fn failure_skips_dependants_with_named_ancestor() {
        let planner = cp_planner::Planner::new(registry());
        let plan = planner
            .plan_from_dict(serde_json::json!({
                "name": "t", "description": "t",
                "artifacts": {
                    "a": {"source": {"type": "failing", "properties": {}}},
                    "b": {"inputs": "a"},
                }
            }))
            .expect("plans");

        let store = Arc::new(InMemoryArtifactStore::new());
        let executor = Executor::new(registry(), store, ServiceContext::new());
        let run_id = cp_core::RunId::generate();
        let state = executor.execute(&plan, run_id, Path::new("runbook.yaml")).await.expect("executes");

        let a = cp_core::ArtifactId::new("a").expect("valid");
        let b = cp_core::ArtifactId::new("b").expect("valid");
        assert!(state.failed.contains(&a));
        assert!(state.skipped.contains(&b));
        assert!(state.artifact_errors[&b].contains("a"));
    }

    #[tokio::test]
    async fn n_equals_one_still_completes_fan_in() {
        let planner = cp_planner::Planner::new(registry());
        let plan = planner
            .plan_from_dict(serde_json::json!({
                "name": "t", "description": "t",
                "artifacts": {
                    "a": {"source": {"type": "echo", "properties": {}}},
                    "b": {"source": {"type": "echo", "properties": {}}},
                    "c": {"inputs": ["a", "b"], "transform": {"type": "passthrough", "properties": {}}},
                }
            }))
            .expect("plans");

        let store = Arc::new(InMemoryArtifactStore::new());
        let executor = Executor::new(registry(), store, ServiceContext::new()).with_concurrency(std::num::NonZeroUsize::MIN);
        let run_id = cp_core::RunId::generate();
        let state = executor.execute(&plan, run_id, Path::new("runbook.yaml")).await.expect("executes");

        assert_eq!(state.completed.len(), 3);
    }

    #[tokio::test]
    async fn resume_does_not_rerun_completed_artifacts() {
        let planner = cp_planner::Planner::new(registry());
        let plan = planner
            .plan_from_dict(serde_json::json!({
                "name": "t", "description": "t",
                "artifacts": {
                    "a": {"source": {"type": "echo", "properties": {}}},
                    "b": {"inputs": "a"},
                }
            }))
            .expect("plans");

        let store = Arc::new(InMemoryArtifactStore::new());
        let executor = Executor::new(registry(), Arc::clone(&store) as Arc<dyn cp_core::ArtifactStore>, ServiceContext::new());
        let run_id = cp_core::RunId::generate();

        let mut state = cp_core::ExecutionState::new(run_id, time::OffsetDateTime::now_utc());
        let a = cp_core::ArtifactId::new("a").expect("valid");
        state.mark_running(a.clone(), time::OffsetDateTime::now_utc());
        state.mark_completed(&a, time::OffsetDateTime::now_utc());
        cp_core::ArtifactStore::put_state(store.as_ref(), run_id, &state).await.expect("seed state");
        let message = cp_core::Message {
            id: "a".to_owned(),
            content: serde_json::json!({"ok": true}),
            schema: Schema::new("standard_input", SchemaVersion::DEFAULT),
            run_id,
            source: None,
            timestamp: time::OffsetDateTime::now_utc(),
            context: None,
            extensions: MessageExtensions { execution: cp_core::ExecutionContext::success(0.1) },
        };
        cp_core::ArtifactStore::put_artifact(store.as_ref(), run_id, &a, &message).await.expect("seed artifact");

        let resumed = executor.resume(&plan, run_id, Path::new("runbook.yaml")).await.expect("resumes");
        assert!(resumed.completed.contains(&a));
        assert!(resumed.completed.contains(&cp_core::ArtifactId::new("b").expect("valid")));
    }

    #[tokio::test]
    async fn cancellation_skips_not_yet_dispatched_artifacts() {
        let planner = cp_planner::Planner::new(registry());
        let plan = planner
            .plan_from_dict(serde_json::json!({
                "name": "t", "description": "t",
                "artifacts": {
                    "a": {"source": {"type": "echo", "properties": {}}},
                }
            }))
            .expect("plans");

        let store = Arc::new(InMemoryArtifactStore::new());
        let executor = Executor::new(registry(), store, ServiceContext::new());
        let cancellation = super::Cancellation::new();
        cancellation.cancel();
        let run_id = cp_core::RunId::generate();
        let state = executor
            .execute_cancellable(&plan, run_id, Path::new("runbook.yaml"), cancellation)
            .await
            .expect("executes");

        assert!(state.skipped.contains(&cp_core::ArtifactId::new("a").expect("valid")));
    }
}
