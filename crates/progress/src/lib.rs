//! Progression logic
//!
//! Graph validation, unlock evaluation, the milestone state machine and
//! progress aggregation. Everything here is pure; persistence and locking
//! live in `pathwise-engine`.

#![warn(missing_docs)]

pub mod validator;
pub mod evaluator;
pub mod transition;
pub mod aggregate;
pub mod estimator;
pub mod stats;

pub use validator::{validate, topological_order, GraphError};
pub use evaluator::{compute_unlocked, promote, seed, NodeStates};
pub use transition::{StateTransition, TransitionValidator};
pub use aggregate::{current_milestone, percentage, recompute};
pub use estimator::{CompletionEstimator, TimeEstimation};
pub use stats::{summarize, GoalCount, LearnerStats};
