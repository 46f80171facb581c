//! Pathwise core data models.
//!
//! This crate defines the milestone graph and the per-learner progress
//! records that the progression engine operates on.

#![warn(missing_docs)]

// Core identities
mod id;

// Graph template
mod milestone;
mod graph;

// Learner state
mod instance;

// Re-exports
pub use id::*;

pub use milestone::{Difficulty, Milestone, Payload};
pub use graph::{GenerationInfo, Graph, GraphMeta};
pub use instance::{
    Customizations, InstanceFilter, LearnerInstance, Lifecycle, MilestoneStatus, NodeState, Note,
    Progress,
};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
