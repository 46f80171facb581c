//! Typed errors returned by the progression service.

use pathwise_core::{GraphId, InstanceId, MilestoneId, MilestoneStatus};
use pathwise_progress::GraphError;
use pathwise_storage::StorageError;

use crate::generator::GeneratorError;

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Errors from progression operations. All are recoverable and leave stored
/// state untouched.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// Graph failed structural validation
    #[error("invalid graph: {0}")]
    Graph(#[from] GraphError),

    /// Milestone is not part of the instance's graph
    #[error("unknown milestone: {0}")]
    UnknownNode(MilestoneId),

    /// Requested status change is not an edge of the state machine
    #[error("cannot move milestone '{milestone}' from {from} to {to}")]
    InvalidTransition {
        /// Milestone
        milestone: MilestoneId,
        /// Current status
        from: MilestoneStatus,
        /// Requested status
        to: MilestoneStatus,
    },

    /// Milestone prerequisites are not completed yet
    #[error("milestone '{0}' is still locked")]
    NodeLocked(MilestoneId),

    /// Learner already has an instance for this graph
    #[error("learner {learner} already follows graph {graph}")]
    AlreadyExists {
        /// Learner id
        learner: String,
        /// Graph id
        graph: GraphId,
    },

    /// No such instance
    #[error("instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// No such graph
    #[error("graph not found: {0}")]
    GraphNotFound(GraphId),

    /// Hours must be finite and non-negative
    #[error("invalid hours: {0}")]
    InvalidHours(f64),

    /// Graph generator failed
    #[error("graph generation failed: {0}")]
    Generator(#[from] GeneratorError),

    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ProgressError {
    /// True for both instance and graph lookups that came back empty.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::InstanceNotFound(_) | Self::GraphNotFound(_) | Self::Storage(StorageError::NotFound(_))
        )
    }

    /// Short message suitable for showing to a learner, without internals.
    pub fn user_message(&self) -> String {
        match self {
            Self::Graph(_) => "This roadmap is malformed and cannot be used.".to_string(),
            Self::UnknownNode(id) => format!("There is no step '{id}' in this roadmap."),
            Self::InvalidTransition { to, .. } => format!("That step can't be marked {to}."),
            Self::NodeLocked(_) => "That step isn't unlocked yet.".to_string(),
            Self::AlreadyExists { .. } => "You are already following this roadmap.".to_string(),
            Self::InstanceNotFound(_) | Self::GraphNotFound(_) => "Roadmap not found.".to_string(),
            Self::InvalidHours(_) => "Hours spent must be a positive number.".to_string(),
            Self::Generator(_) => "The roadmap could not be generated. Please try again.".to_string(),
            Self::Storage(StorageError::NotFound(_)) => "Roadmap not found.".to_string(),
            Self::Storage(_) => "Something went wrong while saving. Please try again.".to_string(),
        }
    }
}
