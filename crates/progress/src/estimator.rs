//! Completion time estimation.

use chrono::{DateTime, Duration, Utc};
use pathwise_core::{Graph, LearnerInstance, MilestoneStatus};
use serde::Serialize;

/// Remaining effort for an instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeEstimation {
    /// Estimated hours left across non-completed milestones
    pub remaining_hours: f64,

    /// Milestones not yet completed
    pub remaining_milestones: usize,

    /// Projected completion at the given weekly pace
    pub projected_completion: Option<DateTime<Utc>>,
}

/// Completion time estimator.
pub struct CompletionEstimator;

impl CompletionEstimator {
    /// Estimate the remaining effort, projecting a finish date when a weekly
    /// pace is given.
    pub fn estimate(
        &self,
        graph: &Graph,
        instance: &LearnerInstance,
        hours_per_week: Option<f64>,
    ) -> TimeEstimation {
        let open: Vec<_> = graph
            .milestones
            .iter()
            .filter(|m| instance.status_of(m.id.as_str()) != Some(MilestoneStatus::Completed))
            .collect();
        let remaining_hours: f64 = open.iter().map(|m| m.estimated_duration.max(0.0)).sum();

        let projected_completion = if open.is_empty() {
            Some(instance.completed_at.unwrap_or_else(Utc::now))
        } else {
            // None when the pace is too slow to land on a representable date
            hours_per_week
                .filter(|pace| pace.is_finite() && *pace > 0.0)
                .and_then(|pace| {
                    let minutes = (remaining_hours / pace * 7.0 * 24.0 * 60.0).ceil() as i64;
                    Duration::try_minutes(minutes)
                        .and_then(|delta| Utc::now().checked_add_signed(delta))
                })
        };

        TimeEstimation {
            remaining_hours,
            remaining_milestones: open.len(),
            projected_completion,
        }
    }
}

impl Default for CompletionEstimator {
    fn default() -> Self {
        Self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::seed;
    use pathwise_core::{GraphMeta, LearnerId, Milestone};

    fn setup() -> (Graph, LearnerInstance) {
        let graph = Graph::new(
            GraphMeta::default(),
            vec![
                Milestone::new("a", "A").with_duration(10.0),
                Milestone::new("b", "B").requires("a").with_duration(20.0),
            ],
        );
        let instance = LearnerInstance::new(LearnerId::from("u"), graph.id, seed(&graph), Utc::now());
        (graph, instance)
    }

    #[test]
    fn test_remaining_hours_excludes_completed() {
        let (graph, mut instance) = setup();
        let estimator = CompletionEstimator;

        let before = estimator.estimate(&graph, &instance, None);
        assert_eq!(before.remaining_hours, 30.0);
        assert_eq!(before.remaining_milestones, 2);
        assert!(before.projected_completion.is_none());

        instance.node_states.get_mut("a").unwrap().status = MilestoneStatus::Completed;
        let after = estimator.estimate(&graph, &instance, Some(10.0));
        assert_eq!(after.remaining_hours, 20.0);

        // 20h at 10h/week is two weeks out
        let eta = after.projected_completion.unwrap();
        let days = (eta - Utc::now()).num_days();
        assert!((13..=14).contains(&days), "got {days} days");
    }

    #[test]
    fn test_glacial_pace_has_no_projection() {
        let (graph, instance) = setup();
        for pace in [1e-300, f64::MIN_POSITIVE, 1e-9] {
            let est = CompletionEstimator.estimate(&graph, &instance, Some(pace));
            assert_eq!(est.remaining_hours, 30.0);
            assert!(est.projected_completion.is_none(), "pace {pace}");
        }
    }

    #[test]
    fn test_finished_instance_projects_completion_time() {
        let (graph, mut instance) = setup();
        for state in instance.node_states.values_mut() {
            state.status = MilestoneStatus::Completed;
        }
        let done_at = Utc::now() - Duration::days(3);
        instance.completed_at = Some(done_at);

        let est = CompletionEstimator.estimate(&graph, &instance, Some(5.0));
        assert_eq!(est.remaining_milestones, 0);
        assert_eq!(est.projected_completion, Some(done_at));
    }
}
