//! In-memory storage backend.
//!
//! Used by tests and embedders that keep state elsewhere. Locks are held
//! only for the map operation itself, never across an await point.

use std::collections::HashMap;
use pathwise_core::{Graph, GraphId, InstanceFilter, InstanceId, LearnerId, LearnerInstance};
use tokio::sync::RwLock;
use super::trait_::check_version;
use super::{Result, Storage, StorageError};

/// Memory-backed storage.
#[derive(Default)]
pub struct MemoryStorage {
    graphs: RwLock<HashMap<GraphId, Graph>>,
    instances: RwLock<Instances>,
}

#[derive(Default)]
struct Instances {
    by_id: HashMap<InstanceId, LearnerInstance>,
    by_pair: HashMap<(LearnerId, GraphId), InstanceId>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn save_graph(&self, graph: &Graph) -> Result<()> {
        let mut graphs = self.graphs.write().await;
        if graphs.contains_key(&graph.id) {
            return Err(StorageError::Duplicate(format!("graph {}", graph.id)));
        }
        graphs.insert(graph.id, graph.clone());
        Ok(())
    }

    async fn load_graph(&self, id: GraphId) -> Result<Option<Graph>> {
        Ok(self.graphs.read().await.get(&id).cloned())
    }

    async fn list_graphs(&self) -> Result<Vec<Graph>> {
        Ok(self.graphs.read().await.values().cloned().collect())
    }

    async fn insert_instance(&self, instance: &LearnerInstance) -> Result<()> {
        let mut instances = self.instances.write().await;
        let pair = (instance.learner_id.clone(), instance.graph_id);
        if instances.by_pair.contains_key(&pair) || instances.by_id.contains_key(&instance.id) {
            return Err(StorageError::Duplicate(format!(
                "instance for learner {} on graph {}",
                instance.learner_id, instance.graph_id
            )));
        }
        instances.by_pair.insert(pair, instance.id);
        instances.by_id.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn load_instance(&self, id: InstanceId) -> Result<Option<LearnerInstance>> {
        Ok(self.instances.read().await.by_id.get(&id).cloned())
    }

    async fn find_instance(
        &self,
        learner_id: &LearnerId,
        graph_id: GraphId,
    ) -> Result<Option<LearnerInstance>> {
        let instances = self.instances.read().await;
        Ok(instances
            .by_pair
            .get(&(learner_id.clone(), graph_id))
            .and_then(|id| instances.by_id.get(id))
            .cloned())
    }

    async fn update_instance(&self, instance: &LearnerInstance) -> Result<()> {
        let mut instances = self.instances.write().await;
        let stored = instances
            .by_id
            .get_mut(&instance.id)
            .ok_or_else(|| StorageError::NotFound(format!("instance {}", instance.id)))?;
        check_version(stored.version, instance)?;
        *stored = instance.clone();
        Ok(())
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<bool> {
        let mut instances = self.instances.write().await;
        match instances.by_id.remove(&id) {
            Some(removed) => {
                instances.by_pair.remove(&(removed.learner_id, removed.graph_id));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_instances(&self, filter: &InstanceFilter) -> Result<Vec<LearnerInstance>> {
        Ok(self
            .instances
            .read()
            .await
            .by_id
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect())
    }
}
