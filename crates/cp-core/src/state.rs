// crates/cp-core/src/state.rs
// ============================================================================
// Module: Execution State & Run Metadata
// Description: Mutable per-run progress record and run identity/lifecycle record.
// Purpose: Give the executor a single, persistable aggregate to mutate and the
//          recovery layer a small, separately persisted identity record.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! [`ExecutionState`] is the append-and-mutate aggregate the executor owns:
//! every artifact lands in exactly one of `completed`, `failed`, or
//! `skipped`, recorded alongside `artifact_errors` for the latter two.
//! [`RunMetadata`] is the smaller identity record consulted by the recovery
//! layer to find interrupted runs.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::identifiers::ArtifactId;
use crate::identifiers::RunId;

/// Mutable, persisted-per-transition progress record for one run.
///
/// # Invariants
/// - `completed`, `failed`, and `skipped` are pairwise disjoint at every
///   observable moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Run this state belongs to.
    pub run_id: RunId,
    /// Artifacts that finished successfully.
    pub completed: BTreeSet<ArtifactId>,
    /// Artifacts that finished with an error.
    pub failed: BTreeSet<ArtifactId>,
    /// Artifacts skipped due to upstream failure or cancellation.
    pub skipped: BTreeSet<ArtifactId>,
    /// Artifacts still pending or running, not yet in any terminal set.
    #[serde(default)]
    pub in_flight: BTreeSet<ArtifactId>,
    /// Human-readable error or skip reason, keyed by artifact.
    pub artifact_errors: BTreeMap<ArtifactId, String>,
    /// Timestamp the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Timestamp of the most recent persisted transition.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ExecutionState {
    /// Builds a fresh, empty state for a run starting now.
    #[must_use]
    pub fn new(run_id: RunId, now: OffsetDateTime) -> Self {
        Self {
            run_id,
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            in_flight: BTreeSet::new(),
            artifact_errors: BTreeMap::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` when `id` has reached any terminal set.
    #[must_use]
    pub fn is_terminal(&self, id: &ArtifactId) -> bool {
        self.completed.contains(id) || self.failed.contains(id) || self.skipped.contains(id)
    }

    /// Marks `id` as dispatched to a worker.
    pub fn mark_running(&mut self, id: ArtifactId, now: OffsetDateTime) {
        self.in_flight.insert(id);
        self.updated_at = now;
    }

    /// Moves `id` from in-flight into `completed`.
    pub fn mark_completed(&mut self, id: &ArtifactId, now: OffsetDateTime) {
        self.in_flight.remove(id);
        self.completed.insert(id.clone());
        self.updated_at = now;
    }

    /// Moves `id` from in-flight into `failed`, recording `reason`.
    pub fn mark_failed(&mut self, id: &ArtifactId, reason: impl Into<String>, now: OffsetDateTime) {
        self.in_flight.remove(id);
        self.failed.insert(id.clone());
        self.artifact_errors.insert(id.clone(), reason.into());
        self.updated_at = now;
    }

    /// Marks `id` as `skipped`, recording `reason`.
    ///
    /// `id` is also removed from `in_flight`, covering the cancellation path
    /// where a running artifact is skipped rather than completed or failed.
    pub fn mark_skipped(&mut self, id: &ArtifactId, reason: impl Into<String>, now: OffsetDateTime) {
        self.in_flight.remove(id);
        self.skipped.insert(id.clone());
        self.artifact_errors.insert(id.clone(), reason.into());
        self.updated_at = now;
    }

    /// Treats every artifact still `in_flight` as not-yet-started.
    ///
    /// Called when resuming after a crash: the previous process's `running`
    /// artifacts are demoted to pending by simply clearing `in_flight`,
    /// since `in_flight` membership alone (outside the terminal sets) is
    /// what distinguishes "was running" from "not yet attempted".
    pub fn reset_in_flight_for_resume(&mut self, now: OffsetDateTime) {
        self.in_flight.clear();
        self.updated_at = now;
    }
}

/// Lifecycle status of a run, as tracked by [`RunMetadata`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is currently executing.
    Running,
    /// The run finished with no failures.
    Completed,
    /// The run finished with at least one failure.
    Failed,
    /// The process exited while the run was `Running`.
    Interrupted,
}

/// Identity and lifecycle record for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Unique identifier of this run.
    pub run_id: RunId,
    /// Filesystem path of the runbook that was executed.
    pub runbook_path: String,
    /// Timestamp the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// Timestamp the run reached a terminal status, if it has.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Whether this run was resumed from prior state at least once.
    pub was_resumed: bool,
}

impl RunMetadata {
    /// Starts a new run's metadata record.
    #[must_use]
    pub fn start(run_id: RunId, runbook_path: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            run_id,
            runbook_path: runbook_path.into(),
            started_at: now,
            completed_at: None,
            status: RunStatus::Running,
            was_resumed: false,
        }
    }

    /// Marks this run as finished with the given terminal status.
    pub fn complete(&mut self, status: RunStatus, now: OffsetDateTime) {
        self.status = status;
        self.completed_at = Some(now);
    }

    /// Marks this run as having been resumed.
    pub fn mark_resumed(&mut self) {
        self.was_resumed = true;
        self.status = RunStatus::Running;
    }
}
