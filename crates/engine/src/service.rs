//! Progression service.

use async_trait::async_trait;
use chrono::Utc;
use pathwise_core::{
    Graph, GraphId, GraphMeta, InstanceFilter, InstanceId, LearnerId, LearnerInstance, Lifecycle,
    MilestoneId, MilestoneStatus, Note,
};
use pathwise_progress::{
    current_milestone, promote, recompute, seed, summarize, validate, CompletionEstimator,
    LearnerStats, StateTransition, TimeEstimation, TransitionValidator,
};
use pathwise_storage::{Storage, StorageError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::error::{ProgressError, Result};
use crate::generator::{GenerateRequest, GraphGenerator};
use crate::locks::InstanceLocks;

/// Progression service.
#[async_trait]
pub trait ProgressionService: Send + Sync {
    /// Attach a learner to a graph, storing the graph if it is new.
    async fn create_instance(&self, learner: LearnerId, graph: Graph) -> Result<LearnerInstance>;

    /// Attach a learner to an already stored graph.
    async fn attach(&self, learner: LearnerId, graph_id: GraphId) -> Result<LearnerInstance>;

    /// Generate a graph for a goal and attach the learner to it.
    async fn generate_instance(
        &self,
        learner: LearnerId,
        request: GenerateRequest,
    ) -> Result<LearnerInstance>;

    /// Move one milestone to a new status.
    async fn advance(&self, id: InstanceId, request: AdvanceRequest) -> Result<LearnerInstance>;

    /// Read an instance.
    async fn get_instance(&self, id: InstanceId) -> Result<LearnerInstance>;

    /// Permanently delete an instance.
    async fn delete_instance(&self, id: InstanceId) -> Result<()>;

    /// List a learner's instances, most recently accessed first.
    async fn list_instances(
        &self,
        learner: &LearnerId,
        query: ListQuery,
    ) -> Result<Page<LearnerInstance>>;

    /// Aggregate statistics over a learner's instances.
    async fn learner_stats(&self, learner: &LearnerId) -> Result<LearnerStats>;

    /// Record a learner customization.
    async fn customize(&self, id: InstanceId, change: Customization) -> Result<LearnerInstance>;

    /// Estimate remaining effort.
    async fn estimate(&self, id: InstanceId, hours_per_week: Option<f64>) -> Result<TimeEstimation>;
}

/// A requested milestone status change.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceRequest {
    /// Milestone to move
    pub milestone: MilestoneId,

    /// Requested status
    pub status: MilestoneStatus,

    /// Hours spent since the last report
    pub hours: Option<f64>,

    /// Free-text note
    pub note: Option<String>,
}

impl AdvanceRequest {
    /// Request a status change with no hours or note.
    pub fn new(milestone: impl Into<MilestoneId>, status: MilestoneStatus) -> Self {
        Self {
            milestone: milestone.into(),
            status,
            hours: None,
            note: None,
        }
    }

    /// Start a milestone.
    pub fn start(milestone: impl Into<MilestoneId>) -> Self {
        Self::new(milestone, MilestoneStatus::InProgress)
    }

    /// Complete a milestone.
    pub fn complete(milestone: impl Into<MilestoneId>) -> Self {
        Self::new(milestone, MilestoneStatus::Completed)
    }

    /// Log hours with the change.
    pub fn with_hours(mut self, hours: f64) -> Self {
        self.hours = Some(hours);
        self
    }

    /// Attach a note to the change.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A learner customization.
#[derive(Debug, Clone, PartialEq)]
pub enum Customization {
    /// Mark a milestone as skipped
    SkipMilestone(MilestoneId),

    /// Attach an extra resource
    AddResource(serde_json::Value),
}

/// Listing parameters.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Only these lifecycle states
    pub lifecycle: Option<Vec<Lifecycle>>,

    /// 1-based page number
    pub page: Option<usize>,

    /// Page size
    pub limit: Option<usize>,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// 1-based page number
    pub page: usize,
    /// Page size used
    pub limit: usize,
    /// Matching items across all pages
    pub total: usize,
    /// Number of pages
    pub total_pages: usize,
}

/// Service over a storage backend and a graph generator.
pub struct BasicProgressionService<S: Storage> {
    storage: Arc<S>,
    generator: Arc<dyn GraphGenerator>,
    locks: InstanceLocks,
    config: ServiceConfig,
}

impl<S: Storage> BasicProgressionService<S> {
    /// Create a service with default configuration.
    pub fn new(storage: Arc<S>, generator: Arc<dyn GraphGenerator>) -> Self {
        Self {
            storage,
            generator,
            locks: InstanceLocks::new(),
            config: ServiceConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Underlying store.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    async fn load(&self, id: InstanceId) -> Result<LearnerInstance> {
        self.storage
            .load_instance(id)
            .await?
            .ok_or(ProgressError::InstanceNotFound(id))
    }

    async fn graph(&self, id: GraphId) -> Result<Graph> {
        self.storage
            .load_graph(id)
            .await?
            .ok_or(ProgressError::GraphNotFound(id))
    }

    /// Bump the version and write. Caller holds the instance lock.
    async fn persist(&self, instance: &mut LearnerInstance) -> Result<()> {
        instance.version += 1;
        match self.storage.update_instance(instance).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if let StorageError::Conflict { found, .. } = &e {
                    warn!(instance = %instance.id, found, "concurrent write from another process");
                }
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl<S: Storage + 'static> ProgressionService for BasicProgressionService<S> {
    async fn create_instance(&self, learner: LearnerId, graph: Graph) -> Result<LearnerInstance> {
        validate(&graph)?;

        // Stored graphs are immutable; instances always follow the stored copy
        let graph = match self.storage.load_graph(graph.id).await? {
            Some(stored) => {
                if stored != graph {
                    warn!(graph = %graph.id, "ignoring supplied graph that differs from the stored one");
                }
                stored
            }
            None => match self.storage.save_graph(&graph).await {
                Ok(()) => graph,
                // another attach stored it first
                Err(StorageError::Duplicate(_)) => self.graph(graph.id).await?,
                Err(e) => return Err(e.into()),
            },
        };

        let now = Utc::now();
        let mut instance = LearnerInstance::new(learner, graph.id, seed(&graph), now);
        recompute(&mut instance);
        instance.progress.current_milestone = current_milestone(&graph, &instance);

        match self.storage.insert_instance(&instance).await {
            Ok(()) => {}
            Err(StorageError::Duplicate(_)) => {
                return Err(ProgressError::AlreadyExists {
                    learner: instance.learner_id.to_string(),
                    graph: graph.id,
                })
            }
            Err(e) => return Err(e.into()),
        }

        info!(
            instance = %instance.id,
            learner = %instance.learner_id,
            graph = %graph.id,
            milestones = graph.len(),
            "instance created"
        );
        Ok(instance)
    }

    async fn attach(&self, learner: LearnerId, graph_id: GraphId) -> Result<LearnerInstance> {
        let graph = self.graph(graph_id).await?;
        self.create_instance(learner, graph).await
    }

    async fn generate_instance(
        &self,
        learner: LearnerId,
        request: GenerateRequest,
    ) -> Result<LearnerInstance> {
        debug!(learner = %learner, goal = %request.goal, "generating graph");
        let graph = self.generator.generate(&request).await?;
        info!(graph = %graph.id, milestones = graph.len(), "graph generated");
        self.create_instance(learner, graph).await
    }

    async fn advance(&self, id: InstanceId, request: AdvanceRequest) -> Result<LearnerInstance> {
        let _guard = self.locks.acquire(id).await;

        let mut instance = self.load(id).await?;
        let graph = self.graph(instance.graph_id).await?;
        let milestone = request.milestone;

        let current = match instance.status_of(milestone.as_str()) {
            Some(status) if graph.contains(milestone.as_str()) => status,
            _ => return Err(ProgressError::UnknownNode(milestone)),
        };
        let target = request.status;

        let transition = TransitionValidator::validate_transition(current, target);
        match transition {
            StateTransition::RejectedLocked => return Err(ProgressError::NodeLocked(milestone)),
            StateTransition::RejectedInvalid => {
                return Err(ProgressError::InvalidTransition {
                    milestone,
                    from: current,
                    to: target,
                })
            }
            StateTransition::Allowed | StateTransition::NoOp => {}
        }

        if let Some(hours) = request.hours {
            if !hours.is_finite() || hours < 0.0 {
                return Err(ProgressError::InvalidHours(hours));
            }
        }

        let now = Utc::now();

        // Retried completion: only the access time moves
        if current == MilestoneStatus::Completed {
            debug!(instance = %id, milestone = %milestone, "already completed");
            instance.last_accessed_at = now;
            self.persist(&mut instance).await?;
            return Ok(instance);
        }

        if transition == StateTransition::Allowed {
            if let Some(node) = instance.node_states.get_mut(milestone.as_str()) {
                node.status = target;
                match target {
                    MilestoneStatus::InProgress => node.started_at = Some(now),
                    MilestoneStatus::Completed => node.completed_at = Some(now),
                    MilestoneStatus::Unlocked => node.started_at = None,
                    MilestoneStatus::Locked => {}
                }
            }

            let promoted = promote(&graph, &mut instance.node_states);
            if !promoted.is_empty() {
                info!(instance = %id, count = promoted.len(), "milestones unlocked");
            }
        }

        recompute(&mut instance);
        instance.progress.hours_spent += request.hours.unwrap_or(0.0);

        if let Some(text) = request.note.filter(|t| !t.trim().is_empty()) {
            instance.notes.push(Note {
                at: now,
                milestone: Some(milestone.clone()),
                text,
            });
        }

        if instance.lifecycle == Lifecycle::NotStarted {
            instance.lifecycle = Lifecycle::InProgress;
            instance.started_at = Some(now);
        }
        if instance.progress.completed == instance.progress.total {
            instance.lifecycle = Lifecycle::Completed;
            instance.completed_at = Some(now);
            info!(instance = %id, "instance completed");
        }

        instance.progress.current_milestone = if target == MilestoneStatus::InProgress {
            Some(milestone.clone())
        } else {
            current_milestone(&graph, &instance)
        };
        instance.last_accessed_at = now;

        self.persist(&mut instance).await?;
        debug!(
            instance = %id,
            milestone = %milestone,
            from = %current,
            to = %target,
            percentage = instance.progress.percentage,
            "milestone advanced"
        );
        Ok(instance)
    }

    async fn get_instance(&self, id: InstanceId) -> Result<LearnerInstance> {
        if !self.config.touch_on_read {
            return self.load(id).await;
        }

        let _guard = self.locks.acquire(id).await;
        let mut instance = self.load(id).await?;
        instance.last_accessed_at = Utc::now();
        self.persist(&mut instance).await?;
        Ok(instance)
    }

    async fn delete_instance(&self, id: InstanceId) -> Result<()> {
        let guard = self.locks.acquire(id).await;
        let deleted = self.storage.delete_instance(id).await?;
        drop(guard);

        if !deleted {
            return Err(ProgressError::InstanceNotFound(id));
        }
        self.locks.forget(id);
        info!(instance = %id, "instance deleted");
        Ok(())
    }

    async fn list_instances(
        &self,
        learner: &LearnerId,
        query: ListQuery,
    ) -> Result<Page<LearnerInstance>> {
        let filter = InstanceFilter {
            lifecycle: query.lifecycle,
            ..InstanceFilter::learner(learner.clone())
        };
        let mut instances = self.storage.list_instances(&filter).await?;
        instances.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let limit = query
            .limit
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size.max(1));
        let page = query.page.unwrap_or(1).max(1);
        let total = instances.len();
        let items = instances
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        Ok(Page {
            items,
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        })
    }

    async fn learner_stats(&self, learner: &LearnerId) -> Result<LearnerStats> {
        let instances = self
            .storage
            .list_instances(&InstanceFilter::learner(learner.clone()))
            .await?;

        let mut metas: HashMap<GraphId, GraphMeta> = HashMap::new();
        for instance in &instances {
            if metas.contains_key(&instance.graph_id) {
                continue;
            }
            let meta = match self.storage.load_graph(instance.graph_id).await? {
                Some(graph) => graph.meta,
                None => {
                    warn!(graph = %instance.graph_id, "instance refers to a missing graph");
                    GraphMeta::default()
                }
            };
            metas.insert(instance.graph_id, meta);
        }

        let fallback = GraphMeta::default();
        Ok(summarize(instances.iter().map(|i| {
            (i, metas.get(&i.graph_id).unwrap_or(&fallback))
        })))
    }

    async fn customize(&self, id: InstanceId, change: Customization) -> Result<LearnerInstance> {
        let _guard = self.locks.acquire(id).await;
        let mut instance = self.load(id).await?;

        match change {
            Customization::SkipMilestone(milestone) => {
                if !instance.node_states.contains_key(milestone.as_str()) {
                    return Err(ProgressError::UnknownNode(milestone));
                }
                instance.customizations.skipped_milestones.insert(milestone);
            }
            Customization::AddResource(resource) => {
                instance.customizations.added_resources.push(resource);
            }
        }

        instance.last_accessed_at = Utc::now();
        self.persist(&mut instance).await?;
        Ok(instance)
    }

    async fn estimate(&self, id: InstanceId, hours_per_week: Option<f64>) -> Result<TimeEstimation> {
        if let Some(pace) = hours_per_week {
            if !pace.is_finite() || pace < 0.0 {
                return Err(ProgressError::InvalidHours(pace));
            }
        }
        let instance = self.load(id).await?;
        let graph = self.graph(instance.graph_id).await?;
        Ok(CompletionEstimator.estimate(&graph, &instance, hours_per_week))
    }
}
