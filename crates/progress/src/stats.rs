//! Learner-level statistics across all of a learner's instances.

use pathwise_core::{Difficulty, GraphMeta, LearnerInstance, Lifecycle};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// How many goals to report in [`LearnerStats::popular_goals`].
pub const TOP_GOALS: usize = 5;

/// Summary of one learner's roadmaps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearnerStats {
    /// Instances the learner has
    pub total_instances: usize,
    /// Instances in progress
    pub active_instances: usize,
    /// Instances completed
    pub completed_instances: usize,
    /// Hours logged across all instances
    pub total_hours_spent: f64,
    /// Mean completion percentage
    pub average_completion: f64,
    /// Instance count per graph difficulty
    pub by_difficulty: BTreeMap<Difficulty, usize>,
    /// Most frequent goals, most common first
    pub popular_goals: Vec<GoalCount>,
}

/// A goal and how many instances pursue it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GoalCount {
    /// Goal text
    pub goal: String,
    /// Number of instances
    pub count: usize,
}

/// Summarize instances paired with their graph metadata.
pub fn summarize<'a, I>(entries: I) -> LearnerStats
where
    I: IntoIterator<Item = (&'a LearnerInstance, &'a GraphMeta)>,
{
    let mut stats = LearnerStats {
        by_difficulty: Difficulty::ALL.iter().map(|d| (*d, 0)).collect(),
        ..Default::default()
    };
    let mut goals: HashMap<&str, usize> = HashMap::new();
    let mut percentage_sum = 0u64;

    for (instance, meta) in entries {
        stats.total_instances += 1;
        match instance.lifecycle {
            Lifecycle::InProgress => stats.active_instances += 1,
            Lifecycle::Completed => stats.completed_instances += 1,
            Lifecycle::NotStarted => {}
        }
        stats.total_hours_spent += instance.progress.hours_spent;
        percentage_sum += u64::from(instance.progress.percentage);
        *stats.by_difficulty.entry(meta.difficulty).or_default() += 1;
        if !meta.goal.is_empty() {
            *goals.entry(meta.goal.as_str()).or_default() += 1;
        }
    }

    if stats.total_instances > 0 {
        stats.average_completion = percentage_sum as f64 / stats.total_instances as f64;
    }

    let mut popular: Vec<GoalCount> = goals
        .into_iter()
        .map(|(goal, count)| GoalCount {
            goal: goal.to_string(),
            count,
        })
        .collect();
    popular.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.goal.cmp(&b.goal)));
    popular.truncate(TOP_GOALS);
    stats.popular_goals = popular;

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathwise_core::{GraphId, LearnerId};
    use std::collections::BTreeMap as Map;

    fn instance(lifecycle: Lifecycle, percentage: u8, hours: f64) -> LearnerInstance {
        let mut i = LearnerInstance::new(LearnerId::from("u"), GraphId::new(), Map::new(), chrono::Utc::now());
        i.lifecycle = lifecycle;
        i.progress.percentage = percentage;
        i.progress.hours_spent = hours;
        i
    }

    fn meta(goal: &str, difficulty: Difficulty) -> GraphMeta {
        GraphMeta {
            goal: goal.to_string(),
            difficulty,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_stats() {
        let stats = summarize(std::iter::empty());
        assert_eq!(stats.total_instances, 0);
        assert_eq!(stats.average_completion, 0.0);
        assert_eq!(stats.by_difficulty.len(), 4);
        assert!(stats.popular_goals.is_empty());
    }

    #[test]
    fn test_counts_and_goal_ranking() {
        let entries = vec![
            (instance(Lifecycle::InProgress, 50, 3.0), meta("rust", Difficulty::Beginner)),
            (instance(Lifecycle::Completed, 100, 10.0), meta("rust", Difficulty::Advanced)),
            (instance(Lifecycle::NotStarted, 0, 0.0), meta("go", Difficulty::Beginner)),
        ];
        let stats = summarize(entries.iter().map(|(i, m)| (i, m)));

        assert_eq!(stats.total_instances, 3);
        assert_eq!(stats.active_instances, 1);
        assert_eq!(stats.completed_instances, 1);
        assert_eq!(stats.total_hours_spent, 13.0);
        assert_eq!(stats.average_completion, 50.0);
        assert_eq!(stats.by_difficulty[&Difficulty::Beginner], 2);
        assert_eq!(stats.by_difficulty[&Difficulty::Expert], 0);
        assert_eq!(
            stats.popular_goals,
            vec![
                GoalCount { goal: "rust".into(), count: 2 },
                GoalCount { goal: "go".into(), count: 1 },
            ]
        );
    }
}
