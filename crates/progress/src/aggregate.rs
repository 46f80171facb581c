//! Aggregate progress derived from node states.

use pathwise_core::{Graph, LearnerInstance, MilestoneId, MilestoneStatus};

/// Percentage complete, rounded half up, in integer arithmetic.
///
/// `total == 0` yields 0; validated graphs are never empty.
pub fn percentage(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let completed = completed.min(total) as u64;
    let total = total as u64;
    ((completed * 100 + total / 2) / total) as u8
}

/// The milestone a learner should focus on: the first in-progress milestone,
/// else the first unlocked one, by `order` then id.
pub fn current_milestone(graph: &Graph, instance: &LearnerInstance) -> Option<MilestoneId> {
    let first_with = |status: MilestoneStatus| {
        graph
            .milestones
            .iter()
            .filter(|m| instance.status_of(m.id.as_str()) == Some(status))
            .min_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)))
            .map(|m| m.id.clone())
    };
    first_with(MilestoneStatus::InProgress).or_else(|| first_with(MilestoneStatus::Unlocked))
}

/// Recompute completed/total/percentage from the node states.
///
/// Counting from the states rather than incrementing keeps the cache from
/// drifting. `current_milestone` and `hours_spent` are left alone.
pub fn recompute(instance: &mut LearnerInstance) {
    let completed = instance.count_completed();
    let total = instance.node_states.len();
    instance.progress.completed = completed;
    instance.progress.total = total;
    instance.progress.percentage = percentage(completed, total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::seed;
    use pathwise_core::{GraphMeta, LearnerId, Milestone};

    #[test]
    fn test_percentage_rounds_half_up() {
        assert_eq!(percentage(0, 3), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13); // 12.5
        assert_eq!(percentage(3, 8), 38); // 37.5
        assert_eq!(percentage(5, 5), 100);
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn test_percentage_is_nearest_integer_for_small_graphs() {
        for total in 1..=50usize {
            for completed in 0..=total {
                let exact = completed as f64 * 100.0 / total as f64;
                let got = percentage(completed, total) as f64;
                assert!((got - exact).abs() <= 0.5 + 1e-9, "{completed}/{total}");

                let is_half = (completed * 200) % (total * 2) == total;
                if is_half {
                    assert!(got > exact, "{completed}/{total} should round up");
                }
            }
        }
    }

    #[test]
    fn test_current_milestone_prefers_in_progress() {
        let graph = Graph::new(
            GraphMeta::default(),
            vec![
                Milestone::new("a", "A").with_order(1),
                Milestone::new("b", "B").with_order(2),
            ],
        );
        let mut instance = LearnerInstance::new(
            LearnerId::from("u"),
            graph.id,
            seed(&graph),
            chrono::Utc::now(),
        );
        assert_eq!(current_milestone(&graph, &instance), Some("a".into()));

        instance.node_states.get_mut("b").unwrap().status = MilestoneStatus::InProgress;
        assert_eq!(current_milestone(&graph, &instance), Some("b".into()));

        for state in instance.node_states.values_mut() {
            state.status = MilestoneStatus::Completed;
        }
        assert_eq!(current_milestone(&graph, &instance), None);

        recompute(&mut instance);
        assert_eq!(instance.progress.completed, 2);
        assert_eq!(instance.progress.percentage, 100);
    }
}
