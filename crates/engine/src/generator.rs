//! Graph generator port.
//!
//! Graph content comes from an external text-generation provider. The
//! engine only sees the [`GraphGenerator`] trait; implementations own the
//! provider call. [`parse_generated_graph`] turns provider text into a
//! validated [`Graph`].

use async_trait::async_trait;
use chrono::Utc;
use pathwise_core::{Difficulty, GenerationInfo, Graph, GraphMeta, Milestone, MilestoneId, Payload};
use pathwise_progress::{validate, GraphError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// What the learner asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Free-text goal
    pub goal: String,

    /// Self-assessed starting level
    #[serde(default)]
    pub current_level: Difficulty,

    /// Hours per week the learner can commit
    #[serde(default = "default_hours_per_week")]
    pub hours_per_week: u32,

    /// Target duration in weeks
    #[serde(default = "default_target_weeks")]
    pub target_weeks: u32,

    /// Skills the learner already has
    #[serde(default)]
    pub existing_skills: Vec<String>,

    /// Areas to emphasise
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

fn default_hours_per_week() -> u32 {
    10
}

fn default_target_weeks() -> u32 {
    12
}

impl GenerateRequest {
    /// Request with default constraints.
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            current_level: Difficulty::default(),
            hours_per_week: default_hours_per_week(),
            target_weeks: default_target_weeks(),
            existing_skills: Vec::new(),
            focus_areas: Vec::new(),
        }
    }
}

/// Errors from a generator.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    /// Provider call failed
    #[error("provider error: {0}")]
    Provider(String),

    /// Output was not the expected JSON
    #[error("unparseable output: {0}")]
    Parse(#[from] serde_json::Error),

    /// Output parsed but is not a sound graph
    #[error("generated graph is invalid: {0}")]
    Invalid(#[from] GraphError),
}

/// Produces a milestone graph for a goal.
///
/// Called outside of any instance lock; implementations may block on I/O.
#[async_trait]
pub trait GraphGenerator: Send + Sync {
    /// Generate a graph for the request.
    async fn generate(&self, request: &GenerateRequest) -> Result<Graph, GeneratorError>;
}

/// Shape of a provider document.
#[derive(Debug, Deserialize)]
struct RawGraph {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    goal: String,
    #[serde(default)]
    difficulty: Option<Difficulty>,
    #[serde(default, alias = "totalDuration")]
    total_duration: Option<f64>,
    #[serde(default, alias = "estimatedWeeks")]
    estimated_weeks: Option<u32>,
    milestones: Vec<RawMilestone>,
}

#[derive(Debug, Deserialize)]
struct RawMilestone {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default)]
    prerequisites: Vec<String>,
    #[serde(default, alias = "estimatedDuration")]
    estimated_duration: Option<f64>,
    #[serde(default)]
    difficulty: Option<Difficulty>,
    #[serde(default)]
    topics: Vec<String>,
    // everything else (resources, projects, assessments, status, ...)
    #[serde(flatten)]
    rest: Payload,
}

fn fenced_json() -> Option<&'static Regex> {
    static FENCED: OnceLock<Option<Regex>> = OnceLock::new();
    FENCED
        .get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").ok())
        .as_ref()
}

/// Parse provider output into a validated graph.
///
/// Accepts either bare JSON or JSON inside a fenced code block. Missing
/// `order` values are filled from position, ids are trimmed, and any
/// milestone fields the engine does not model are kept in the payload.
/// A provider-supplied `status` is dropped: the engine seeds states itself.
pub fn parse_generated_graph(
    text: &str,
    request: &GenerateRequest,
    generated_by: &str,
    tokens: Option<u64>,
) -> Result<Graph, GeneratorError> {
    let json = fenced_json()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map_or(text.trim(), |m| m.as_str());
    let raw: RawGraph = serde_json::from_str(json)?;

    let milestones: Vec<Milestone> = raw
        .milestones
        .into_iter()
        .enumerate()
        .map(|(index, m)| {
            let mut payload = m.rest;
            payload.remove("status");
            payload.remove("completedAt");
            Milestone {
                id: MilestoneId::from(m.id.trim()),
                title: m.title,
                description: m.description,
                order: m.order.unwrap_or(index as i64 + 1),
                prerequisites: m
                    .prerequisites
                    .iter()
                    .map(|p| MilestoneId::from(p.trim()))
                    .collect::<BTreeSet<_>>(),
                estimated_duration: m.estimated_duration.unwrap_or(0.0).max(0.0),
                difficulty: m.difficulty.unwrap_or(request.current_level),
                topics: m.topics,
                payload,
            }
        })
        .collect();

    let goal = if raw.goal.is_empty() { request.goal.clone() } else { raw.goal };

    let mut graph = Graph::new(
        GraphMeta {
            title: raw.title,
            description: raw.description,
            goal,
            difficulty: raw.difficulty.unwrap_or(request.current_level),
            total_duration: raw.total_duration.unwrap_or(0.0),
            estimated_weeks: raw.estimated_weeks.unwrap_or(request.target_weeks),
            generation: Some(GenerationInfo {
                generated_at: Utc::now(),
                generated_by: generated_by.to_string(),
                tokens,
            }),
        },
        milestones,
    );
    if raw.total_duration.is_none() {
        graph.meta.total_duration = graph.estimated_hours();
    }

    validate(&graph)?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FENCED: &str = r#"Here is your roadmap:

```json
{
  "title": "Web Dev",
  "description": "From zero to deploy",
  "totalDuration": 40,
  "milestones": [
    {"id": " m1 ", "title": "HTML", "status": "unlocked", "prerequisites": [],
     "resources": [{"type": "video", "title": "Intro"}]},
    {"id": "m2", "title": "CSS", "prerequisites": ["m1 "], "estimatedDuration": 6},
    {"id": "m3", "title": "JS", "order": 9, "prerequisites": ["m1", "m2"], "difficulty": "advanced"}
  ]
}
```
Good luck!"#;

    #[test]
    fn test_parse_fenced_output() {
        let request = GenerateRequest::new("become a web developer");
        let graph = parse_generated_graph(FENCED, &request, "test-model", Some(1200)).unwrap();

        assert_eq!(graph.meta.title, "Web Dev");
        assert_eq!(graph.meta.goal, "become a web developer");
        assert_eq!(graph.meta.total_duration, 40.0);
        assert_eq!(graph.meta.estimated_weeks, 12);
        assert_eq!(graph.meta.generation.as_ref().unwrap().tokens, Some(1200));

        let m1 = graph.milestone("m1").unwrap();
        assert_eq!(m1.order, 1);
        assert!(m1.payload.contains_key("resources"));
        assert!(!m1.payload.contains_key("status"));

        let m2 = graph.milestone("m2").unwrap();
        assert!(m2.prerequisites.contains("m1"));
        assert_eq!(m2.estimated_duration, 6.0);
        assert_eq!(m2.difficulty, Difficulty::Intermediate);

        let m3 = graph.milestone("m3").unwrap();
        assert_eq!(m3.order, 9);
        assert_eq!(m3.difficulty, Difficulty::Advanced);
    }

    #[test]
    fn test_parse_bare_json() {
        let text = r#"{"title": "T", "milestones": [
            {"id": "a", "title": "A", "estimatedDuration": 3},
            {"id": "b", "title": "B", "estimatedDuration": 4.5}
        ]}"#;
        let graph = parse_generated_graph(text, &GenerateRequest::new("g"), "m", None).unwrap();
        assert_eq!(graph.len(), 2);
        // no stated total: summed from milestones
        assert_eq!(graph.meta.total_duration, 7.5);
    }

    #[test]
    fn test_parse_rejects_cyclic_output() {
        let text = r#"{"title": "T", "milestones": [
            {"id": "a", "title": "A", "prerequisites": ["b"]},
            {"id": "b", "title": "B", "prerequisites": ["a"]}
        ]}"#;
        let err = parse_generated_graph(text, &GenerateRequest::new("g"), "m", None).unwrap_err();
        assert!(matches!(err, GeneratorError::Invalid(GraphError::Cycle(_))));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_generated_graph("sorry, I can't", &GenerateRequest::new("g"), "m", None)
            .unwrap_err();
        assert!(matches!(err, GeneratorError::Parse(_)));
    }
}
