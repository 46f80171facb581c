//! Milestone state machine.
//!
//! ```text
//! Locked     --(evaluator)-->  Unlocked
//! Unlocked   --(start)-->      InProgress
//! Unlocked   --(complete)-->   Completed
//! InProgress --(complete)-->   Completed
//! InProgress --(abandon)-->    Unlocked
//! ```
//!
//! `Completed` is terminal. Learners can never move a node into or out of
//! `Locked`; only the evaluator unlocks.

use pathwise_core::MilestoneStatus;

/// Outcome of checking a learner-requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTransition {
    /// Apply the new status
    Allowed,

    /// Already in the requested state; nothing to apply
    NoOp,

    /// Node is still locked
    RejectedLocked,

    /// Not an edge of the state machine
    RejectedInvalid,
}

/// Milestone transition validator.
pub struct TransitionValidator;

impl TransitionValidator {
    /// Validate a learner-requested transition.
    pub fn validate_transition(current: MilestoneStatus, target: MilestoneStatus) -> StateTransition {
        use MilestoneStatus::*;

        match (current, target) {
            // Start
            (Unlocked, InProgress) => StateTransition::Allowed,

            // Complete, with or without starting first
            (Unlocked, Completed) | (InProgress, Completed) => StateTransition::Allowed,

            // Abandon: back to reachable-but-not-started
            (InProgress, Unlocked) => StateTransition::Allowed,

            // Re-completion and continued work are harmless
            (Completed, Completed) | (InProgress, InProgress) => StateTransition::NoOp,

            // Progressing a node the graph has not opened yet
            (Locked, InProgress) | (Locked, Completed) => StateTransition::RejectedLocked,

            // Manual unlock/lock, leaving Completed, Unlocked -> Unlocked
            _ => StateTransition::RejectedInvalid,
        }
    }

    /// Statuses a learner may request from `current`.
    pub fn allowed_targets(current: MilestoneStatus) -> &'static [MilestoneStatus] {
        use MilestoneStatus::*;

        match current {
            Locked => &[],
            Unlocked => &[InProgress, Completed],
            InProgress => &[Completed, Unlocked],
            Completed => &[],
        }
    }
}
