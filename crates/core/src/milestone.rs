//! Milestone model - a node of a learning graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use crate::id::MilestoneId;

/// Opaque sub-resources attached to a milestone (readings, projects,
/// assessments). The engine stores and returns these untouched.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A unit of learning content with prerequisites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    /// Identifier, unique within the graph
    pub id: MilestoneId,

    /// Milestone title
    pub title: String,

    /// Detailed description
    #[serde(default)]
    pub description: String,

    /// Display and tie-break hint; never used for unlocking
    #[serde(default)]
    pub order: i64,

    /// Milestones that must be completed before this one is reachable
    #[serde(default)]
    pub prerequisites: BTreeSet<MilestoneId>,

    /// Estimated effort in hours
    #[serde(default)]
    pub estimated_duration: f64,

    /// Difficulty level
    #[serde(default)]
    pub difficulty: Difficulty,

    /// Topics covered
    #[serde(default)]
    pub topics: Vec<String>,

    /// Uninterpreted attachments
    #[serde(default)]
    pub payload: Payload,
}

impl Milestone {
    /// Create a milestone with no prerequisites.
    pub fn new(id: impl Into<MilestoneId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            order: 0,
            prerequisites: BTreeSet::new(),
            estimated_duration: 0.0,
            difficulty: Difficulty::default(),
            topics: Vec::new(),
            payload: Payload::new(),
        }
    }

    /// Add a prerequisite.
    pub fn requires(mut self, id: impl Into<MilestoneId>) -> Self {
        self.prerequisites.insert(id.into());
        self
    }

    /// Set the display order.
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    /// Set the estimated duration in hours.
    pub fn with_duration(mut self, hours: f64) -> Self {
        self.estimated_duration = hours;
        self
    }

    /// True when the milestone is reachable without completing anything.
    pub fn is_root(&self) -> bool {
        self.prerequisites.is_empty()
    }
}

/// Difficulty level of a milestone or whole graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Entry level
    Beginner,
    /// Some prior exposure expected
    #[default]
    Intermediate,
    /// Solid working knowledge expected
    Advanced,
    /// Specialist
    Expert,
}

impl Difficulty {
    /// All levels, easiest first.
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Beginner,
        Difficulty::Intermediate,
        Difficulty::Advanced,
        Difficulty::Expert,
    ];

    /// Lowercase name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
            Difficulty::Expert => "expert",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            "expert" => Ok(Difficulty::Expert),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}
