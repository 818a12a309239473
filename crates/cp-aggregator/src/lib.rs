// crates/cp-aggregator/src/lib.rs
// ============================================================================
// Crate: cp-aggregator
// Description: Builds the final export structure from an ExecutionState and
//              its ExecutionPlan.
// Purpose: Turn a completed (or partially completed) run into the bundle a
//          report exporter consumes.
// Dependencies: cp-core, cp-planner, serde, serde_json, thiserror, time,
//               tracing
// ============================================================================

//! # cp-aggregator
//!
//! [`aggregate`] implements spec.md §4.10 verbatim: from an
//! [`cp_core::ExecutionState`] and the [`cp_planner::ExecutionPlan`] it was
//! produced against, build a deterministic [`ExportBundle`] — run identity
//! and status, runbook identity, pass/fail/skip counts, every `output: true`
//! artifact's content, every failure's error, and the list of skipped
//! artifact ids.
//!
//! Grounded on `decision-gate-contract::contract`'s deterministic-bundle-
//! assembly style (explicit struct field order rather than an
//! insertion-order `HashMap`, so two aggregations of the same state produce
//! byte-identical JSON) and `decision-gate-core::core::summary::SafeSummary`
//! for the shape of a small status/count summary type.

use cp_core::ArtifactId;
use cp_core::ArtifactStore;
use cp_core::ExecutionState;
use cp_core::RunId;
use cp_core::Schema;
use cp_core::error::StoreError;
use cp_planner::ExecutionPlan;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

/// Fixed export format version, spec.md §4.10.
pub const FORMAT_VERSION: &str = "2.0.0";

/// Error raised while aggregating a run's results.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// A completed artifact's payload could not be loaded from the store.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Overall disposition of a run, spec.md §4.10: `failed` if any artifact
/// failed; `partial` if none failed but at least one was skipped; else
/// `completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every artifact completed successfully.
    Completed,
    /// No artifact failed, but at least one was skipped.
    Partial,
    /// At least one artifact failed.
    Failed,
}

impl RunOutcome {
    /// Derives the outcome from a run's failed/skipped sets.
    #[must_use]
    pub fn from_state(state: &ExecutionState) -> Self {
        if !state.failed.is_empty() {
            Self::Failed
        } else if !state.skipped.is_empty() {
            Self::Partial
        } else {
            Self::Completed
        }
    }
}

/// Run identity and outcome, spec.md §4.10 `run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Identifier of the aggregated run.
    pub run_id: RunId,
    /// ISO-8601 timestamp, with timezone, of the run's start.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Total wall-clock duration, in seconds, from start to the most recent
    /// persisted transition.
    pub duration_seconds: f64,
    /// Overall disposition.
    pub status: RunOutcome,
}

/// Runbook identity, spec.md §4.10 `runbook`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookSummary {
    /// Runbook name.
    pub name: String,
    /// Runbook description.
    pub description: String,
    /// Runbook-level contact, if declared.
    pub contact: Option<String>,
}

/// Pass/fail/skip counts, spec.md §4.10 `summary`.
///
/// # Invariants
/// - `total == succeeded + failed + skipped`; every count is non-negative.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CountSummary {
    /// Total artifacts in the plan.
    pub total: usize,
    /// Artifacts that completed successfully.
    pub succeeded: usize,
    /// Artifacts that failed.
    pub failed: usize,
    /// Artifacts that were skipped.
    pub skipped: usize,
}

/// One successful, `output: true` artifact's contribution to the export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputEntry {
    /// Artifact id this entry was produced by.
    pub artifact_id: ArtifactId,
    /// Wall-clock duration of the artifact's execution, in seconds.
    pub duration_seconds: Option<f64>,
    /// Declared display name, if any.
    pub name: Option<String>,
    /// Declared description, if any.
    pub description: Option<String>,
    /// Declared contact, if any.
    pub contact: Option<String>,
    /// The schema this artifact's content claims to satisfy.
    pub schema: Schema,
    /// The artifact's content.
    pub content: serde_json::Value,
}

/// One failed artifact's error, spec.md §4.10 `errors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// The artifact that failed.
    pub artifact_id: ArtifactId,
    /// The recorded error string.
    pub error: String,
}

/// The complete export structure produced by [`aggregate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    /// Fixed export format version, always [`FORMAT_VERSION`].
    pub format_version: String,
    /// Run identity and outcome.
    pub run: RunSummary,
    /// Runbook identity.
    pub runbook: RunbookSummary,
    /// Pass/fail/skip counts.
    pub summary: CountSummary,
    /// Every `output: true` artifact's content, in runbook declaration
    /// order.
    pub outputs: Vec<OutputEntry>,
    /// Every failed artifact's error, in runbook declaration order.
    pub errors: Vec<ErrorEntry>,
    /// Ids of every skipped artifact, in runbook declaration order.
    pub skipped: Vec<ArtifactId>,
}

/// Builds the final export structure from `state` and the `plan` it was
/// produced against.
///
/// # Errors
///
/// Returns [`AggregatorError::Store`] when a completed, `output: true`
/// artifact's payload cannot be loaded from `store` — this should not
/// happen for a state the executor itself produced (spec.md §8
/// "persistence-before-completion"), but a hand-assembled or corrupted
/// state could violate it.
#[tracing::instrument(skip(plan, state, store), fields(run_id = %state.run_id))]
pub async fn aggregate(
    plan: &ExecutionPlan,
    state: &ExecutionState,
    store: &dyn ArtifactStore,
) -> Result<ExportBundle, AggregatorError> {
    let runbook = plan.runbook();
    let total = plan.artifact_ids().count();
    let summary = CountSummary { total, succeeded: state.completed.len(), failed: state.failed.len(), skipped: state.skipped.len() };

    let mut outputs = Vec::new();
    for artifact_id in plan.artifact_ids() {
        let definition = &runbook.artifacts[artifact_id];
        if !definition.output || !state.completed.contains(artifact_id) {
            continue;
        }
        let message = store.get_artifact(state.run_id, artifact_id).await?;
        let schema = plan.schemas_for(artifact_id).map_or_else(|| message.schema.clone(), |(_, output)| output.clone());
        outputs.push(OutputEntry {
            artifact_id: artifact_id.clone(),
            duration_seconds: message.execution_duration(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            contact: definition.contact.clone(),
            schema,
            content: message.content,
        });
    }

    let errors: Vec<ErrorEntry> = plan
        .artifact_ids()
        .filter(|id| state.failed.contains(*id))
        .map(|id| ErrorEntry { artifact_id: id.clone(), error: state.artifact_errors.get(id).cloned().unwrap_or_default() })
        .collect();

    let skipped: Vec<ArtifactId> = plan.artifact_ids().filter(|id| state.skipped.contains(*id)).cloned().collect();

    let duration_seconds = (state.updated_at - state.started_at).as_seconds_f64().max(0.0);

    Ok(ExportBundle {
        format_version: FORMAT_VERSION.to_owned(),
        run: RunSummary { run_id: state.run_id, started_at: state.started_at, duration_seconds, status: RunOutcome::from_state(state) },
        runbook: RunbookSummary { name: runbook.name.clone(), description: runbook.description.clone(), contact: runbook.contact.clone() },
        summary,
        outputs,
        errors,
        skipped,
    })
}
