//! Structural validation of milestone graphs.
//!
//! A graph must pass [`validate`] before any learner instance is seeded from
//! it. Generated graphs are untrusted, so every graph goes through here.

use pathwise_core::{Graph, Milestone, MilestoneId};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Structural defects in a graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Graph has no milestones
    #[error("graph has no milestones")]
    Empty,

    /// Two milestones share an id
    #[error("duplicate milestone id: {0}")]
    DuplicateMilestone(MilestoneId),

    /// A prerequisite points at a milestone that does not exist
    #[error("milestone '{milestone}' requires unknown milestone '{prerequisite}'")]
    UnknownPrerequisite {
        /// The milestone declaring the prerequisite
        milestone: MilestoneId,
        /// The missing id
        prerequisite: MilestoneId,
    },

    /// Prerequisites form a cycle
    #[error("prerequisite cycle: {}", format_cycle(.0))]
    Cycle(Vec<MilestoneId>),
}

fn format_cycle(path: &[MilestoneId]) -> String {
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Check a graph for soundness: non-empty, unique ids, known
/// prerequisites and no cycles.
pub fn validate(graph: &Graph) -> Result<(), GraphError> {
    if graph.is_empty() {
        return Err(GraphError::Empty);
    }

    let mut seen = HashSet::new();
    for milestone in &graph.milestones {
        if !seen.insert(milestone.id.as_str()) {
            return Err(GraphError::DuplicateMilestone(milestone.id.clone()));
        }
    }

    for milestone in &graph.milestones {
        for prerequisite in &milestone.prerequisites {
            if !seen.contains(prerequisite.as_str()) {
                return Err(GraphError::UnknownPrerequisite {
                    milestone: milestone.id.clone(),
                    prerequisite: prerequisite.clone(),
                });
            }
        }
    }

    if let Some(cycle) = find_cycle(graph) {
        return Err(GraphError::Cycle(cycle));
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Iterative three-colour DFS over prerequisite edges. Returns the cycle
/// path with its first node repeated at the end.
fn find_cycle(graph: &Graph) -> Option<Vec<MilestoneId>> {
    let index: HashMap<&str, &Milestone> = graph
        .milestones
        .iter()
        .map(|m| (m.id.as_str(), m))
        .collect();
    let mut color: HashMap<&str, Color> = index.keys().map(|k| (*k, Color::White)).collect();

    for start in &graph.milestones {
        if color[start.id.as_str()] != Color::White {
            continue;
        }

        // Each frame is a node plus the iterator over its remaining edges.
        let mut stack: Vec<(&str, std::collections::btree_set::Iter<'_, MilestoneId>)> =
            vec![(start.id.as_str(), start.prerequisites.iter())];
        color.insert(start.id.as_str(), Color::Gray);

        while let Some((node, edges)) = stack.last_mut() {
            let node = *node;
            match edges.next() {
                Some(next) => {
                    let next = next.as_str();
                    match color.get(next).copied() {
                        Some(Color::White) => {
                            color.insert(next, Color::Gray);
                            let prerequisites = index[next].prerequisites.iter();
                            stack.push((next, prerequisites));
                        }
                        Some(Color::Gray) => {
                            let from = stack.iter().position(|(id, _)| *id == next).unwrap_or(0);
                            let mut path: Vec<MilestoneId> = stack[from..]
                                .iter()
                                .map(|(id, _)| MilestoneId::from(*id))
                                .collect();
                            path.push(MilestoneId::from(next));
                            return Some(path);
                        }
                        // Black, or unknown (reported by the reference check)
                        _ => {}
                    }
                }
                None => {
                    color.insert(node, Color::Black);
                    stack.pop();
                }
            }
        }
    }

    None
}

/// Milestones in dependency order: every milestone appears after all of its
/// prerequisites. Ties are broken by `order`, then id.
pub fn topological_order(graph: &Graph) -> Result<Vec<&Milestone>, GraphError> {
    validate(graph)?;

    let mut remaining: HashMap<&str, usize> = graph
        .milestones
        .iter()
        .map(|m| (m.id.as_str(), m.prerequisites.len()))
        .collect();
    let by_id: HashMap<&str, &Milestone> = graph
        .milestones
        .iter()
        .map(|m| (m.id.as_str(), m))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for milestone in &graph.milestones {
        for prerequisite in &milestone.prerequisites {
            dependents
                .entry(prerequisite.as_str())
                .or_default()
                .push(milestone.id.as_str());
        }
    }

    let key = |m: &Milestone| (m.order, m.id.clone());
    let mut ready: BTreeMap<(i64, MilestoneId), &Milestone> = graph
        .milestones
        .iter()
        .filter(|m| m.is_root())
        .map(|m| (key(m), m))
        .collect();

    let mut sorted = Vec::with_capacity(graph.len());
    let mut emitted = BTreeSet::new();
    while let Some((_, milestone)) = ready.pop_first() {
        if !emitted.insert(milestone.id.as_str()) {
            continue;
        }
        sorted.push(milestone);

        for dependent in dependents.get(milestone.id.as_str()).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    let m = by_id[dependent];
                    ready.insert(key(m), m);
                }
            }
        }
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathwise_core::GraphMeta;

    fn graph(milestones: Vec<Milestone>) -> Graph {
        Graph::new(GraphMeta::default(), milestones)
    }

    fn diamond() -> Graph {
        graph(vec![
            Milestone::new("a", "A").with_order(1),
            Milestone::new("b", "B").requires("a").with_order(2),
            Milestone::new("c", "C").requires("a").with_order(3),
            Milestone::new("d", "D").requires("b").requires("c").with_order(4),
        ])
    }

    #[test]
    fn test_valid_diamond() {
        assert_eq!(validate(&diamond()), Ok(()));
    }

    #[test]
    fn test_empty_graph_rejected() {
        assert_eq!(validate(&graph(vec![])), Err(GraphError::Empty));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let g = graph(vec![Milestone::new("a", "A"), Milestone::new("a", "Again")]);
        assert_eq!(validate(&g), Err(GraphError::DuplicateMilestone("a".into())));
    }

    #[test]
    fn test_dangling_prerequisite_rejected() {
        let g = graph(vec![Milestone::new("a", "A").requires("ghost")]);
        assert!(matches!(
            validate(&g),
            Err(GraphError::UnknownPrerequisite { prerequisite, .. }) if prerequisite.as_str() == "ghost"
        ));
    }

    #[test]
    fn test_self_loop_rejected() {
        let g = graph(vec![Milestone::new("a", "A").requires("a")]);
        assert_eq!(
            validate(&g),
            Err(GraphError::Cycle(vec!["a".into(), "a".into()]))
        );
    }

    #[test]
    fn test_transitive_cycle_rejected() {
        let g = graph(vec![
            Milestone::new("root", "Root"),
            Milestone::new("a", "A").requires("root").requires("c"),
            Milestone::new("b", "B").requires("a"),
            Milestone::new("c", "C").requires("b"),
        ]);
        match validate(&g) {
            Err(GraphError::Cycle(path)) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
                for id in ["a", "b", "c"] {
                    assert!(path.iter().any(|p| p.as_str() == id));
                }
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_without_any_root_rejected() {
        // every node has a prerequisite, so there is no entry point
        let g = graph(vec![
            Milestone::new("a", "A").requires("b"),
            Milestone::new("b", "B").requires("a"),
        ]);
        assert!(matches!(validate(&g), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_cycle_error_message() {
        let err = GraphError::Cycle(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "prerequisite cycle: a -> b -> a");
    }

    #[test]
    fn test_topological_order_respects_prerequisites() {
        let g = diamond();
        let order: Vec<_> = topological_order(&g)
            .unwrap()
            .into_iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_topological_order_uses_order_hint_for_ties() {
        let g = graph(vec![
            Milestone::new("x", "X").with_order(2),
            Milestone::new("y", "Y").with_order(1),
            Milestone::new("z", "Z").requires("x").with_order(0),
        ]);
        let order: Vec<_> = topological_order(&g)
            .unwrap()
            .into_iter()
            .map(|m| m.id.as_str())
            .collect();
        assert_eq!(order, vec!["y", "x", "z"]);
    }
}
