//! Unlock evaluation.
//!
//! A locked milestone becomes unlocked iff every one of its prerequisites is
//! completed. The evaluator always rescans the whole graph instead of
//! patching from the last event, so promotions cannot drift from the
//! completion state.

use pathwise_core::{Graph, MilestoneId, MilestoneStatus, NodeState};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Node states keyed by milestone id.
pub type NodeStates = BTreeMap<MilestoneId, NodeState>;

/// Locked milestones whose full prerequisite set is completed.
///
/// Milestones with no prerequisites are always eligible while locked.
/// Pure and idempotent.
pub fn compute_unlocked(graph: &Graph, states: &NodeStates) -> BTreeSet<MilestoneId> {
    graph
        .milestones
        .iter()
        .filter(|m| {
            states
                .get(m.id.as_str())
                .map_or(true, |s| s.status == MilestoneStatus::Locked)
        })
        .filter(|m| {
            m.prerequisites.iter().all(|p| {
                states
                    .get(p.as_str())
                    .is_some_and(|s| s.status == MilestoneStatus::Completed)
            })
        })
        .map(|m| m.id.clone())
        .collect()
}

/// Promote every eligible milestone to `Unlocked` and return the promoted ids.
///
/// One pass reaches the fixpoint: unlocking never completes anything, so no
/// second round can become eligible.
pub fn promote(graph: &Graph, states: &mut NodeStates) -> BTreeSet<MilestoneId> {
    let unlocked = compute_unlocked(graph, states);
    for id in &unlocked {
        states
            .entry(id.clone())
            .and_modify(|s| s.status = MilestoneStatus::Unlocked)
            .or_insert_with(|| NodeState::new(MilestoneStatus::Unlocked));
    }
    if !unlocked.is_empty() {
        debug!(graph = %graph.id, count = unlocked.len(), "promoted milestones");
    }
    unlocked
}

/// Initial state map for a fresh instance: roots unlocked, everything else
/// locked. Total over the graph's milestones.
pub fn seed(graph: &Graph) -> NodeStates {
    let mut states: NodeStates = graph
        .ids()
        .map(|id| (id.clone(), NodeState::new(MilestoneStatus::Locked)))
        .collect();
    promote(graph, &mut states);
    states
}
