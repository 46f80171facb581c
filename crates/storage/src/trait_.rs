//! Storage trait abstraction.

use async_trait::async_trait;
use pathwise_core::{Graph, GraphId, InstanceFilter, InstanceId, LearnerId, LearnerInstance};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SQLite error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Item already exists (graph id, or learner x graph pair)
    #[error("Already exists: {0}")]
    Duplicate(String),

    /// Optimistic version check failed
    #[error("Version conflict on {id}: expected {expected}, found {found}")]
    Conflict {
        /// Instance id
        id: InstanceId,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Persistence port for graphs and learner instances.
///
/// All methods take `&self`: backends use interior mutability so a single
/// store can be shared behind an `Arc` without a global lock.
///
/// Graphs are immutable once saved. Instances are versioned: every update
/// names the version it was derived from and fails with
/// [`StorageError::Conflict`] if another write got there first.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Graph operations ===

    /// Save a new graph. Fails with `Duplicate` if the id is taken.
    async fn save_graph(&self, graph: &Graph) -> Result<()>;

    /// Load a graph by ID.
    async fn load_graph(&self, id: GraphId) -> Result<Option<Graph>>;

    /// List all graphs.
    async fn list_graphs(&self) -> Result<Vec<Graph>>;

    // === Instance operations ===

    /// Insert a new instance. Fails with `Duplicate` if the learner already
    /// has an instance for the same graph.
    async fn insert_instance(&self, instance: &LearnerInstance) -> Result<()>;

    /// Load an instance by ID.
    async fn load_instance(&self, id: InstanceId) -> Result<Option<LearnerInstance>>;

    /// Find the instance of a learner for a graph.
    async fn find_instance(
        &self,
        learner_id: &LearnerId,
        graph_id: GraphId,
    ) -> Result<Option<LearnerInstance>>;

    /// Replace an existing instance. `instance.version` must be exactly one
    /// more than the stored version.
    async fn update_instance(&self, instance: &LearnerInstance) -> Result<()>;

    /// Delete an instance. Returns false if there was nothing to delete.
    async fn delete_instance(&self, id: InstanceId) -> Result<bool>;

    /// List instances matching the filter, in no particular order.
    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<LearnerInstance>>;
}

/// Shared check for `update_instance` implementations.
pub(crate) fn check_version(stored: u64, incoming: &LearnerInstance) -> Result<()> {
    if incoming.version != stored + 1 {
        return Err(StorageError::Conflict {
            id: incoming.id,
            expected: incoming.version.saturating_sub(1),
            found: stored,
        });
    }
    Ok(())
}
