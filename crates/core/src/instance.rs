//! Learner instance model - one learner's mutable progress against a graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use crate::id::{GraphId, InstanceId, LearnerId, MilestoneId};
use crate::Time;

/// Per-learner progress state for a single graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerInstance {
    /// Unique identifier
    pub id: InstanceId,

    /// Owning learner
    pub learner_id: LearnerId,

    /// Graph this instance follows
    pub graph_id: GraphId,

    /// Write counter, bumped on every persisted change
    pub version: u64,

    /// Exactly one state per milestone of the graph
    pub node_states: BTreeMap<MilestoneId, NodeState>,

    /// Cached aggregate progress
    pub progress: Progress,

    /// Overall status
    pub lifecycle: Lifecycle,

    /// First learner transition
    pub started_at: Option<Time>,

    /// When every milestone was completed
    pub completed_at: Option<Time>,

    /// Last read or write
    pub last_accessed_at: Time,

    /// When the learner attached to the graph
    pub created_at: Time,

    /// Append-only learner notes
    #[serde(default)]
    pub notes: Vec<Note>,

    /// Learner-specific deviations
    #[serde(default)]
    pub customizations: Customizations,
}

impl LearnerInstance {
    /// Create an instance from seeded node states.
    pub fn new(
        learner_id: LearnerId,
        graph_id: GraphId,
        node_states: BTreeMap<MilestoneId, NodeState>,
        now: Time,
    ) -> Self {
        let total = node_states.len();
        Self {
            id: InstanceId::new(),
            learner_id,
            graph_id,
            version: 0,
            node_states,
            progress: Progress {
                total,
                ..Default::default()
            },
            lifecycle: Lifecycle::NotStarted,
            started_at: None,
            completed_at: None,
            last_accessed_at: now,
            created_at: now,
            notes: Vec::new(),
            customizations: Customizations::default(),
        }
    }

    /// Current status of a milestone, if it belongs to the graph.
    pub fn status_of(&self, id: &str) -> Option<MilestoneStatus> {
        self.node_states.get(id).map(|s| s.status)
    }

    /// Ids that are no longer locked.
    pub fn reachable(&self) -> BTreeSet<MilestoneId> {
        self.node_states
            .iter()
            .filter(|(_, s)| s.status != MilestoneStatus::Locked)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of completed milestones, counted from node states.
    pub fn count_completed(&self) -> usize {
        self.node_states
            .values()
            .filter(|s| s.status == MilestoneStatus::Completed)
            .count()
    }
}

/// Status of a single milestone for one learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    /// Prerequisites not yet completed
    Locked,
    /// Reachable, not started
    Unlocked,
    /// Being worked on
    InProgress,
    /// Done (terminal)
    Completed,
}

impl MilestoneStatus {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Locked => "locked",
            MilestoneStatus::Unlocked => "unlocked",
            MilestoneStatus::InProgress => "in_progress",
            MilestoneStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for MilestoneStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MilestoneStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "locked" => Ok(MilestoneStatus::Locked),
            "unlocked" => Ok(MilestoneStatus::Unlocked),
            "in_progress" | "started" => Ok(MilestoneStatus::InProgress),
            "completed" | "done" => Ok(MilestoneStatus::Completed),
            other => Err(format!("unknown milestone status: {other}")),
        }
    }
}

/// Per-milestone state record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    /// Current status
    pub status: MilestoneStatus,

    /// When the learner started the milestone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Time>,

    /// When the learner completed the milestone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Time>,
}

impl NodeState {
    /// A state with no timestamps.
    pub fn new(status: MilestoneStatus) -> Self {
        Self {
            status,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Overall instance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    /// No learner transition yet
    NotStarted,
    /// At least one learner transition
    InProgress,
    /// Every milestone completed (terminal)
    Completed,
}

impl Lifecycle {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::NotStarted => "not_started",
            Lifecycle::InProgress => "in_progress",
            Lifecycle::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Lifecycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "not_started" => Ok(Lifecycle::NotStarted),
            "in_progress" | "active" => Ok(Lifecycle::InProgress),
            "completed" => Ok(Lifecycle::Completed),
            other => Err(format!("unknown lifecycle: {other}")),
        }
    }
}

/// Aggregate progress of an instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Completed milestones
    pub completed: usize,

    /// Milestones in the graph
    pub total: usize,

    /// Percentage complete (0-100), rounded half up
    pub percentage: u8,

    /// Milestone the learner is focused on
    pub current_milestone: Option<MilestoneId>,

    /// Cumulative hours logged; never decreases
    pub hours_spent: f64,
}

/// A learner note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// When the note was written
    pub at: Time,

    /// Milestone the note was written against
    #[serde(default)]
    pub milestone: Option<MilestoneId>,

    /// Note text
    pub text: String,
}

/// Learner-specific deviations from the graph. Informational only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Customizations {
    /// Milestones the learner marked as skipped
    #[serde(default)]
    pub skipped_milestones: BTreeSet<MilestoneId>,

    /// Extra resources the learner attached
    #[serde(default)]
    pub added_resources: Vec<serde_json::Value>,
}

/// Filter for querying instances.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceFilter {
    /// Only this learner's instances
    pub learner_id: Option<LearnerId>,

    /// Only instances following this graph
    pub graph_id: Option<GraphId>,

    /// Only instances in one of these lifecycle states
    pub lifecycle: Option<Vec<Lifecycle>>,
}

impl InstanceFilter {
    /// Filter on a single learner.
    pub fn learner(learner_id: LearnerId) -> Self {
        Self {
            learner_id: Some(learner_id),
            ..Default::default()
        }
    }

    /// True if the instance passes the filter.
    pub fn matches(&self, instance: &LearnerInstance) -> bool {
        if let Some(learner) = &self.learner_id {
            if &instance.learner_id != learner {
                return false;
            }
        }
        if let Some(graph) = &self.graph_id {
            if &instance.graph_id != graph {
                return false;
            }
        }
        if let Some(states) = &self.lifecycle {
            if !states.contains(&instance.lifecycle) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&MilestoneStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!("done".parse::<MilestoneStatus>().unwrap(), MilestoneStatus::Completed);
        assert_eq!("in-progress".parse::<MilestoneStatus>().unwrap(), MilestoneStatus::InProgress);
        assert!("paused".parse::<MilestoneStatus>().is_err());
    }

    #[test]
    fn test_filter_matches() {
        let mut states = BTreeMap::new();
        states.insert(MilestoneId::from("a"), NodeState::new(MilestoneStatus::Unlocked));
        let instance = LearnerInstance::new(
            LearnerId::from("u1"),
            GraphId::new(),
            states,
            chrono::Utc::now(),
        );
        assert_eq!(instance.progress.total, 1);

        assert!(InstanceFilter::learner(LearnerId::from("u1")).matches(&instance));
        assert!(!InstanceFilter::learner(LearnerId::from("u2")).matches(&instance));

        let filter = InstanceFilter {
            lifecycle: Some(vec![Lifecycle::Completed]),
            ..Default::default()
        };
        assert!(!filter.matches(&instance));
    }
}
