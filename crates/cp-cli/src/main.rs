// crates/cp-cli/src/main.rs
// ============================================================================
// Module: Compliance Pipeline CLI Entry Point
// Description: Command dispatcher for running, resuming, and inspecting
//              compliance runbook executions.
// Purpose: Give operators a single binary to drive the orchestration engine.
// Dependencies: clap, cp-aggregator, cp-components, cp-core, cp-executor,
//               cp-planner, cp-registry, cp-store, serde_json, thiserror,
//               time, tokio, tracing, tracing-subscriber.
// ============================================================================

//! ## Overview
//! Mirrors `decision-gate-cli::main`'s shape: a [`clap::Parser`] tree, a
//! `CliError`/`CliResult` pair, and a thin `run()` that `main()` unwraps into
//! a [`std::process::ExitCode`]. Exit codes follow spec.md §6.2: `0` success,
//! `1` validation failure, `2` runtime failure, `3` cancelled.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr as _;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use cp_core::ArtifactStoreConfig;
use cp_core::RunId;
use cp_core::RunMetadata;
use cp_core::RunStatus;
use cp_core::ServiceContext;
use cp_executor::Cancellation;
use cp_executor::Executor;
use cp_planner::Planner;
use cp_registry::ComponentRegistry;
use thiserror::Error;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

/// CLI error wrapper; its [`Display`](std::fmt::Display) text is the line
/// written to stderr on failure, paired with the process exit code it maps
/// to (spec.md §6.2).
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
    /// Exit code this failure maps to: `1` validation, `2` runtime.
    exit_code: u8,
}

impl CliError {
    /// Builds a validation-failure error (exit code `1`): a bad runbook,
    /// configuration, or command-line argument.
    fn validation(message: impl std::fmt::Display) -> Self {
        Self { message: message.to_string(), exit_code: 1 }
    }

    /// Builds a runtime-failure error (exit code `2`): the store, executor,
    /// or aggregator failed outside of per-artifact bookkeeping.
    fn runtime(message: impl std::fmt::Display) -> Self {
        Self { message: message.to_string(), exit_code: 2 }
    }
}

/// Result alias for fallible CLI operations.
type CliResult<T> = Result<T, CliError>;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "compliance-pipeline", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Plans and executes a runbook.
    Run(RunCommand),
    /// Resumes a previously interrupted run.
    Resume(ResumeCommand),
    /// Enumerates runs or registered component factories.
    List {
        /// Selected listing subcommand.
        #[command(subcommand)]
        command: ListCommand,
    },
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
struct RunCommand {
    /// Path to the runbook YAML file.
    runbook: PathBuf,
    /// Bounded worker pool size; defaults to available parallelism.
    #[arg(long)]
    concurrency: Option<std::num::NonZeroUsize>,
    /// Explicit run id to use instead of a freshly generated one.
    #[arg(long = "run-id")]
    run_id: Option<String>,
    /// Resumes `--run-id` instead of starting a fresh run.
    #[arg(long, action = ArgAction::SetTrue)]
    resume: bool,
    /// Overrides `RUST_LOG`/`COMPLIANCE_LOG` for this invocation.
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

/// Arguments for the `resume` command.
#[derive(Args, Debug)]
struct ResumeCommand {
    /// Run id to resume.
    run_id: String,
    /// Overrides `RUST_LOG`/`COMPLIANCE_LOG` for this invocation.
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

/// Listing subcommands.
#[derive(Subcommand, Debug)]
enum ListCommand {
    /// Enumerates known runs.
    Runs {
        /// Restricts the listing to runs in this lifecycle status.
        #[arg(long, value_enum)]
        status: Option<RunStatusArg>,
    },
    /// Enumerates registered connector factories.
    Connectors,
    /// Enumerates registered analyser factories.
    Analysers,
    /// Enumerates registered classifier factories.
    Classifiers,
    /// Enumerates registered ruleset versions.
    Rulesets,
    /// Enumerates registered exporter factories (always empty; exporters
    /// are out of scope for this engine, spec.md Non-goals).
    Exporters,
}

/// Lifecycle status filter for `list runs --status`.
#[derive(ValueEnum, Copy, Clone, Debug)]
enum RunStatusArg {
    /// The run is currently executing.
    Running,
    /// The run finished with no failures.
    Completed,
    /// The run finished with at least one failure.
    Failed,
    /// The process exited while the run was running.
    Interrupted,
}

impl RunStatusArg {
    /// Returns `true` when `status` is the lifecycle status this filter
    /// names.
    const fn matches(self, status: RunStatus) -> bool {
        matches!(
            (self, status),
            (Self::Running, RunStatus::Running)
                | (Self::Completed, RunStatus::Completed)
                | (Self::Failed, RunStatus::Failed)
                | (Self::Interrupted, RunStatus::Interrupted)
        )
    }
}

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err),
    }
}

/// Writes `err`'s message to stderr and returns its mapped exit code.
fn emit_error(err: &CliError) -> ExitCode {
    let _ = write_stderr_line(&err.message);
    ExitCode::from(err.exit_code)
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(command) => command_run(command).await,
        Commands::Resume(command) => command_resume(command).await,
        Commands::List { command } => command_list(command).await,
    }
}

/// Initializes the global tracing subscriber, preferring an explicit
/// `--log-level` over `RUST_LOG`/`COMPLIANCE_LOG`, defaulting to `info`.
fn init_logging(log_level: Option<&str>) {
    let filter = log_level.map_or_else(
        || {
            EnvFilter::try_from_env("RUST_LOG")
                .or_else(|_| EnvFilter::try_from_env("COMPLIANCE_LOG"))
                .unwrap_or_else(|_| EnvFilter::new("info"))
        },
        EnvFilter::new,
    );
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Builds the component registry, wired with the built-in connectors and
/// transforms, shared between planning and execution.
fn build_registry() -> Arc<ComponentRegistry> {
    let registry = ComponentRegistry::new();
    cp_components::register_builtins(&registry).expect("built-in component names never collide");
    Arc::new(registry)
}

/// Resolves the artifact store backend from the process environment.
fn build_store() -> CliResult<Arc<dyn cp_core::ArtifactStore>> {
    let config = ArtifactStoreConfig::from_env().map_err(CliError::validation)?;
    Ok(cp_store::build(&config))
}

/// Builds an executor over `registry`/`store`, applying `concurrency` when
/// given.
fn build_executor(registry: Arc<ComponentRegistry>, store: Arc<dyn cp_core::ArtifactStore>, concurrency: Option<std::num::NonZeroUsize>) -> Executor {
    let executor = Executor::new(registry, store, ServiceContext::new());
    match concurrency {
        Some(concurrency) => executor.with_concurrency(concurrency),
        None => executor,
    }
}

/// Spawns a task that requests cancellation when the process receives
/// Ctrl+C, for the scheduler to observe between dispatch ticks.
fn spawn_ctrl_c_watcher(cancellation: Cancellation) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancellation.cancel();
        }
    })
}

/// Executes the `run` command: plans `command.runbook`, then executes or
/// resumes it depending on `--resume`.
async fn command_run(command: RunCommand) -> CliResult<ExitCode> {
    init_logging(command.log_level.as_deref());
    tracing::info!(runbook = %command.runbook.display(), resume = command.resume, "starting run");

    let registry = build_registry();
    let store = build_store()?;
    let planner = Planner::new(Arc::clone(&registry));
    let plan = planner.plan(&command.runbook).map_err(CliError::validation)?;

    let run_id = match &command.run_id {
        Some(raw) => RunId::from_str(raw).map_err(|error| CliError::validation(format!("invalid --run-id '{raw}': {error}")))?,
        None => RunId::generate(),
    };

    let executor = build_executor(registry, Arc::clone(&store), command.concurrency);
    let cancellation = Cancellation::new();
    let watcher = spawn_ctrl_c_watcher(cancellation.clone());

    let outcome = if command.resume {
        executor.resume(&plan, run_id, &command.runbook).await
    } else {
        let metadata = RunMetadata::start(run_id, command.runbook.to_string_lossy(), OffsetDateTime::now_utc());
        store.put_metadata(run_id, &metadata).await.map_err(CliError::runtime)?;
        executor.execute_cancellable(&plan, run_id, &command.runbook, cancellation.clone()).await
    };
    watcher.abort();

    finish_run(store.as_ref(), &plan, run_id, outcome, cancellation.is_cancelled()).await
}

/// Executes the `resume` command: reloads the run's runbook path from its
/// persisted metadata, then resumes it.
async fn command_resume(command: ResumeCommand) -> CliResult<ExitCode> {
    init_logging(command.log_level.as_deref());
    tracing::info!(run_id = %command.run_id, "resuming run");

    let run_id = RunId::from_str(&command.run_id)
        .map_err(|error| CliError::validation(format!("invalid run id '{}': {error}", command.run_id)))?;

    let registry = build_registry();
    let store = build_store()?;
    let metadata = store.get_metadata(run_id).await.map_err(CliError::runtime)?;
    let runbook_path = PathBuf::from(&metadata.runbook_path);

    let planner = Planner::new(Arc::clone(&registry));
    let plan = planner.plan(&runbook_path).map_err(CliError::validation)?;

    let executor = build_executor(registry, Arc::clone(&store), None);
    let outcome = executor.resume(&plan, run_id, &runbook_path).await;

    finish_run(store.as_ref(), &plan, run_id, outcome, false).await
}

/// Finalizes a run: persists its terminal `RunMetadata` status, prints the
/// aggregated export bundle, and maps the outcome to an exit code.
async fn finish_run(
    store: &dyn cp_core::ArtifactStore,
    plan: &cp_planner::ExecutionPlan,
    run_id: RunId,
    outcome: Result<cp_core::ExecutionState, cp_executor::ExecutorError>,
    was_cancelled: bool,
) -> CliResult<ExitCode> {
    let state = outcome.map_err(CliError::runtime)?;

    let status = if was_cancelled {
        RunStatus::Interrupted
    } else if state.failed.is_empty() {
        RunStatus::Completed
    } else {
        RunStatus::Failed
    };
    if let Ok(mut metadata) = store.get_metadata(run_id).await {
        metadata.complete(status, OffsetDateTime::now_utc());
        let _ = store.put_metadata(run_id, &metadata).await;
    }

    let bundle = cp_aggregator::aggregate(plan, &state, store).await.map_err(CliError::runtime)?;
    let rendered = serde_json::to_string_pretty(&bundle).map_err(CliError::runtime)?;
    write_stdout_line(&rendered).map_err(CliError::runtime)?;

    if was_cancelled {
        return Ok(ExitCode::from(3));
    }
    if !state.failed.is_empty() {
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes a `list` subcommand.
async fn command_list(command: ListCommand) -> CliResult<ExitCode> {
    match command {
        ListCommand::Runs { status } => list_runs(status).await,
        ListCommand::Connectors => {
            let registry = build_registry();
            print_lines(registry.list_connectors()).map_err(CliError::runtime)?;
            Ok(ExitCode::SUCCESS)
        }
        ListCommand::Analysers => {
            let registry = build_registry();
            print_lines(registry.list_analysers()).map_err(CliError::runtime)?;
            Ok(ExitCode::SUCCESS)
        }
        ListCommand::Classifiers => {
            let registry = build_registry();
            print_lines(registry.list_classifiers()).map_err(CliError::runtime)?;
            Ok(ExitCode::SUCCESS)
        }
        ListCommand::Rulesets => {
            let rulesets = cp_core::ruleset::RulesetRegistry::new();
            let rows = rulesets.list().into_iter().map(|(name, version, rule_type)| format!("{name}/{version} ({rule_type:?})"));
            print_lines(rows.collect::<Vec<_>>()).map_err(CliError::runtime)?;
            Ok(ExitCode::SUCCESS)
        }
        ListCommand::Exporters => {
            // Exporters are out of scope for this engine (spec.md Non-goals);
            // the verb exists so tooling can enumerate all five kinds uniformly.
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Executes `list runs`, optionally filtered by `--status`.
async fn list_runs(status: Option<RunStatusArg>) -> CliResult<ExitCode> {
    let store = build_store()?;
    let run_ids = store.list_runs().await.map_err(CliError::runtime)?;
    let mut rows = Vec::with_capacity(run_ids.len());
    for run_id in run_ids {
        let metadata = store.get_metadata(run_id).await.map_err(CliError::runtime)?;
        if status.is_none_or(|filter| filter.matches(metadata.status)) {
            rows.push(format!("{run_id}\t{:?}\t{}", metadata.status, metadata.runbook_path));
        }
    }
    print_lines(rows).map_err(CliError::runtime)?;
    Ok(ExitCode::SUCCESS)
}

/// Writes each of `lines` to stdout, one per line.
fn print_lines(lines: impl IntoIterator<Item = String>) -> std::io::Result<()> {
    for line in lines {
        write_stdout_line(&line)?;
    }
    Ok(())
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(stderr, "{message}")
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::Cli;
    use super::Commands;
    use super::RunStatusArg;
    use cp_core::RunStatus;

    #[test]
    fn run_status_arg_matches_only_its_own_status() {
        assert!(RunStatusArg::Running.matches(RunStatus::Running));
        assert!(!RunStatusArg::Running.matches(RunStatus::Completed));
        assert!(RunStatusArg::Interrupted.matches(RunStatus::Interrupted));
        assert!(!RunStatusArg::Failed.matches(RunStatus::Completed));
    }

    #[test]
    fn cli_parses_run_command_flags() {
        let cli = Cli::parse_from([
            "compliance-pipeline",
            "run",
            "runbook.yaml",
            "--concurrency",
            "4",
            "--run-id",
            "11111111-1111-1111-1111-111111111111",
            "--resume",
        ]);
        let Commands::Run(command) = cli.command else { panic!("expected Run") };
        assert_eq!(command.runbook.to_str(), Some("runbook.yaml"));
        assert_eq!(command.concurrency.map(std::num::NonZeroUsize::get), Some(4));
        assert!(command.resume);
    }

    #[test]
    fn cli_parses_list_runs_with_status_filter() {
        let cli = Cli::parse_from(["compliance-pipeline", "list", "runs", "--status", "failed"]);
        let Commands::List { command } = cli.command else { panic!("expected List") };
        let super::ListCommand::Runs { status } = command else { panic!("expected Runs") };
        assert!(matches!(status, Some(RunStatusArg::Failed)));
    }

    #[tokio::test]
    async fn planning_and_executing_a_file_backed_runbook_produces_a_completed_bundle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source_path = dir.path().join("input.txt");
        tokio::fs::write(&source_path, b"hello").await.expect("write input");

        let runbook_path = dir.path().join("runbook.yaml");
        let runbook_yaml = format!(
            "name: smoke\ndescription: smoke test\nartifacts:\n  a:\n    source:\n      type: file\n      properties:\n        path: \"{}\"\n    output_schema: text_file\n  b:\n    inputs: a\n    output: true\n",
            source_path.display()
        );
        tokio::fs::write(&runbook_path, runbook_yaml).await.expect("write runbook");

        let registry = super::build_registry();
        let store = cp_store::build(&cp_core::ArtifactStoreConfig::Local { root: dir.path().join("store") });
        let planner = super::Planner::new(std::sync::Arc::clone(&registry));
        let plan = planner.plan(&runbook_path).expect("plans");

        let executor = super::build_executor(registry, std::sync::Arc::clone(&store), None);
        let run_id = super::RunId::generate();
        let state = executor.execute(&plan, run_id, &runbook_path).await.expect("executes");
        assert!(state.failed.is_empty());
        assert!(state.completed.contains(&cp_core::ArtifactId::new("b").expect("valid")));

        let bundle = cp_aggregator::aggregate(&plan, &state, store.as_ref()).await.expect("aggregates");
        assert_eq!(bundle.outputs.len(), 1);
        assert_eq!(bundle.outputs[0].content["content"], "hello");
    }
}
