// crates/cp-dag/src/lib.rs
// ============================================================================
// Crate: cp-dag
// Description: Topological structure over a runbook's artifacts.
// Purpose: Detect cycles and drive the executor's dependency-respecting
//          dispatch loop through an incremental ready-set sorter.
// Dependencies: cp-core, petgraph, thiserror
// ============================================================================

//! # cp-dag
//!
//! [`ExecutionDag`] builds a `petgraph` directed graph from a runbook's
//! artifacts, edges running from each upstream id to its dependants.
//! [`ExecutionDag::create_sorter`] returns a [`ReadySorter`]: a Kahn-style
//! incremental walker, not a one-shot topological sort, because the executor
//! needs to interleave `get_ready()` calls with out-of-band completions
//! (workers finishing out of dispatch order).

use std::collections::HashMap;
use std::collections::VecDeque;

use cp_core::ArtifactId;
use cp_core::Runbook;
use petgraph::Direction;
use petgraph::graph::DiGraph;
use petgraph::graph::NodeIndex;
use thiserror::Error;

/// Error raised when a runbook's artifact graph contains a cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cycle detected among artifacts: {0:?}")]
pub struct CycleDetectedError(pub Vec<ArtifactId>);

/// Topological structure over a runbook's artifacts.
///
/// Edges run from an upstream artifact to each of its direct dependants,
/// mirroring `inputs` declarations.
#[derive(Clone)]
pub struct ExecutionDag {
    graph: DiGraph<ArtifactId, ()>,
    index_of: HashMap<ArtifactId, NodeIndex>,
    /// Declaration order of artifact ids, preserved from the runbook.
    declaration_order: Vec<ArtifactId>,
}

impl ExecutionDag {
    /// Builds a DAG from a runbook's artifacts. Does not itself check for
    /// cycles; call [`ExecutionDag::validate`] before scheduling.
    ///
    /// Unknown input references are tolerated here (the planner surfaces
    /// `MissingArtifactError` for those); this constructor only wires edges
    /// for inputs that do resolve to a declared artifact.
    #[must_use]
    pub fn build(runbook: &Runbook) -> Self {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::with_capacity(runbook.artifacts.len());
        let mut declaration_order = Vec::with_capacity(runbook.artifacts.len());

        for id in runbook.artifacts.keys() {
            let idx = graph.add_node(id.clone());
            index_of.insert(id.clone(), idx);
            declaration_order.push(id.clone());
        }
        for (id, definition) in &runbook.artifacts {
            let Some(&to) = index_of.get(id) else { continue };
            for input in definition.inputs() {
                if let Some(&from) = index_of.get(input) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self { graph, index_of, declaration_order }
    }

    /// Returns `true` when `id` was declared in the runbook this DAG was
    /// built from.
    #[must_use]
    pub fn contains(&self, id: &ArtifactId) -> bool {
        self.index_of.contains_key(id)
    }

    /// Validates that the graph contains no cycle.
    ///
    /// # Errors
    ///
    /// Returns [`CycleDetectedError`] naming every artifact that belongs to
    /// a strongly connected component of size greater than one.
    pub fn validate(&self) -> Result<(), CycleDetectedError> {
        use petgraph::algo::tarjan_scc;

        let mut cyclic: Vec<ArtifactId> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .flat_map(|component| component.into_iter().map(|idx| self.graph[idx].clone()))
            .collect();

        for idx in self.index_of.values() {
            if self.graph.neighbors_directed(*idx, Direction::Incoming).any(|neighbor| neighbor == *idx) {
                let id = self.graph[*idx].clone();
                if !cyclic.contains(&id) {
                    cyclic.push(id);
                }
            }
        }

        if cyclic.is_empty() { Ok(()) } else { Err(CycleDetectedError(cyclic)) }
    }

    /// Returns the direct upstream ids of `id`, in no particular order.
    #[must_use]
    pub fn predecessors(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        let Some(&idx) = self.index_of.get(id) else { return Vec::new() };
        self.graph.neighbors_directed(idx, Direction::Incoming).map(|n| self.graph[n].clone()).collect()
    }

    /// Returns the direct downstream ids of `id`, in no particular order.
    #[must_use]
    pub fn successors(&self, id: &ArtifactId) -> Vec<ArtifactId> {
        let Some(&idx) = self.index_of.get(id) else { return Vec::new() };
        self.graph.neighbors_directed(idx, Direction::Outgoing).map(|n| self.graph[n].clone()).collect()
    }

    /// Starts a fresh incremental ready-set sorter over this DAG.
    #[must_use]
    pub fn create_sorter(&self) -> ReadySorter<'_> {
        let mut indegree = HashMap::with_capacity(self.index_of.len());
        for idx in self.index_of.values() {
            indegree.insert(*idx, self.graph.neighbors_directed(*idx, Direction::Incoming).count());
        }
        let ready: VecDeque<NodeIndex> = self
            .declaration_order
            .iter()
            .map(|id| self.index_of[id])
            .filter(|idx| indegree[idx] == 0)
            .collect();

        ReadySorter { dag: self, indegree, ready, remaining: self.index_of.len() }
    }
}

/// Incremental Kahn-style topological walker.
///
/// The caller repeatedly drains [`ReadySorter::get_ready`] and, once each
/// returned id's execution has been dispatched and later finishes, calls
/// [`ReadySorter::mark_done`] to release its dependants into readiness.
pub struct ReadySorter<'a> {
    dag: &'a ExecutionDag,
    indegree: HashMap<NodeIndex, usize>,
    ready: VecDeque<NodeIndex>,
    remaining: usize,
}

impl ReadySorter<'_> {
    /// Drains every artifact id that is currently ready (all its inputs have
    /// already been passed to [`ReadySorter::mark_done`]), in declaration
    /// order. Each id is returned at most once across the sorter's lifetime.
    pub fn get_ready(&mut self) -> Vec<ArtifactId> {
        self.ready.drain(..).map(|idx| self.dag.graph[idx].clone()).collect()
    }

    /// Releases `id`'s direct dependants whose other inputs are already
    /// satisfied, making them ready on the next [`ReadySorter::get_ready`]
    /// call.
    pub fn mark_done(&mut self, id: &ArtifactId) {
        let Some(&idx) = self.dag.index_of.get(id) else { return };
        self.remaining = self.remaining.saturating_sub(1);
        for successor in self.dag.graph.neighbors_directed(idx, Direction::Outgoing) {
            if let Some(count) = self.indegree.get_mut(&successor) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.ready.push_back(successor);
                }
            }
        }
    }

    /// Returns `true` once every artifact has been passed to
    /// [`ReadySorter::mark_done`] and no more can ever become ready.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
