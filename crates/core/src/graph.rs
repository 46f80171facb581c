//! Graph model - the shared, read-only template of a learning path.

use serde::{Deserialize, Serialize};
use crate::id::{GraphId, MilestoneId};
use crate::milestone::{Difficulty, Milestone};
use crate::Time;

/// An ordered collection of milestones plus graph-level metadata.
///
/// Graphs are produced once and never mutated by learner activity; many
/// learner instances may point at the same graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Unique identifier
    pub id: GraphId,

    /// Descriptive metadata
    pub meta: GraphMeta,

    /// Milestones in author order
    pub milestones: Vec<Milestone>,
}

/// Graph-level metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphMeta {
    /// Path title
    pub title: String,

    /// Overview of the path
    #[serde(default)]
    pub description: String,

    /// The learner goal this path was built for
    #[serde(default)]
    pub goal: String,

    /// Overall difficulty
    #[serde(default)]
    pub difficulty: Difficulty,

    /// Total estimate in hours as stated by the author
    #[serde(default)]
    pub total_duration: f64,

    /// Estimated calendar weeks
    #[serde(default)]
    pub estimated_weeks: u32,

    /// Provenance when the graph came from a generator
    #[serde(default)]
    pub generation: Option<GenerationInfo>,
}

/// Provenance of a generated graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationInfo {
    /// When the provider produced the graph
    pub generated_at: Time,

    /// Provider or model name
    pub generated_by: String,

    /// Tokens consumed, if reported
    #[serde(default)]
    pub tokens: Option<u64>,
}

impl Graph {
    /// Create a graph with a fresh id.
    pub fn new(meta: GraphMeta, milestones: Vec<Milestone>) -> Self {
        Self {
            id: GraphId::new(),
            meta,
            milestones,
        }
    }

    /// Look up a milestone by id.
    pub fn milestone(&self, id: &str) -> Option<&Milestone> {
        self.milestones.iter().find(|m| m.id.as_str() == id)
    }

    /// True if the graph contains the milestone.
    pub fn contains(&self, id: &str) -> bool {
        self.milestone(id).is_some()
    }

    /// Number of milestones.
    pub fn len(&self) -> usize {
        self.milestones.len()
    }

    /// True if the graph has no milestones.
    pub fn is_empty(&self) -> bool {
        self.milestones.is_empty()
    }

    /// Milestone ids in author order.
    pub fn ids(&self) -> impl Iterator<Item = &MilestoneId> {
        self.milestones.iter().map(|m| &m.id)
    }

    /// Sum of milestone estimates in hours.
    pub fn estimated_hours(&self) -> f64 {
        self.milestones.iter().map(|m| m.estimated_duration).sum()
    }
}
