//! Storage abstraction and implementations for Pathwise.
//!
//! This crate provides the persistence port used by the progression engine,
//! with in-memory, JSON-file and (feature `sqlite`) SQLite backends.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
#[cfg(feature = "json")]
pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{Storage, StorageError, Result};
pub use memory::MemoryStorage;
#[cfg(feature = "json")]
pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;

#[cfg(test)]
pub(crate) mod test_support {
    use pathwise_core::{
        Graph, GraphMeta, LearnerId, LearnerInstance, Milestone, MilestoneId, MilestoneStatus,
        NodeState,
    };
    use std::collections::BTreeMap;

    pub fn sample_graph() -> Graph {
        Graph::new(
            GraphMeta {
                title: "Sample".to_string(),
                goal: "learn".to_string(),
                ..Default::default()
            },
            vec![
                Milestone::new("a", "A"),
                Milestone::new("b", "B").requires("a"),
            ],
        )
    }

    pub fn sample_instance(graph: &Graph, learner: &str) -> LearnerInstance {
        let states: BTreeMap<MilestoneId, NodeState> = graph
            .milestones
            .iter()
            .map(|m| {
                let status = if m.is_root() {
                    MilestoneStatus::Unlocked
                } else {
                    MilestoneStatus::Locked
                };
                (m.id.clone(), NodeState::new(status))
            })
            .collect();
        LearnerInstance::new(LearnerId::from(learner), graph.id, states, chrono::Utc::now())
    }
}
