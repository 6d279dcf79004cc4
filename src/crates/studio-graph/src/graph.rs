//! Workflow graph projection for visual observers
//!
//! [`WorkflowGraph`] is a read-only view of a run: one node per step with
//! its current status, one edge per dependency, branch, or container
//! relationship. It is carried by `graph_update` events so UIs can render
//! progress without holding workflow state themselves.

use crate::step::{StepStatus, WorkflowState, WorkflowStep};
use serde::{Deserialize, Serialize};

/// Snapshot of a workflow's structure and per-step progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// One step in the graph view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub step_type: String,
    /// Prompt text for task steps, None for containers and gates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    /// Terminal status once the step has run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
}

/// Relationship between two steps
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Edge classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// `to` depends on `from` completing successfully
    Dependency,
    /// `from` is a conditional routing to branch target `to`
    Branch,
    /// `from` is a container (parallel or loop) executing child `to`
    Child,
}

impl WorkflowGraph {
    /// Project the current run state into a graph view
    pub fn from_state(state: &WorkflowState) -> Self {
        let mut nodes = Vec::with_capacity(state.steps.len());
        let mut edges = Vec::new();

        for step in &state.steps {
            let task = match step {
                WorkflowStep::Task(t) => Some(t.task.clone()),
                WorkflowStep::Human(h) => Some(h.prompt.clone()),
                _ => None,
            };
            nodes.push(GraphNode {
                id: step.id().to_string(),
                step_type: step.step_type().to_string(),
                task,
                status: state.step_results.get(step.id()).map(|r| r.status),
            });

            for dep in step.deps() {
                edges.push(GraphEdge {
                    from: dep.clone(),
                    to: step.id().to_string(),
                    kind: EdgeKind::Dependency,
                });
            }

            let kind = match step {
                WorkflowStep::Conditional(_) => EdgeKind::Branch,
                _ => EdgeKind::Child,
            };
            for child in step.referenced_steps() {
                edges.push(GraphEdge {
                    from: step.id().to_string(),
                    to: child.to_string(),
                    kind,
                });
            }
        }

        Self { nodes, edges }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepResult;
    use serde_json::json;

    #[test]
    fn test_graph_projection() {
        let steps: Vec<WorkflowStep> = serde_json::from_value(json!([
            {"type": "task", "id": "a", "role": "dev", "task": "one"},
            {"type": "task", "id": "b", "role": "dev", "task": "two", "deps": ["a"]},
            {"type": "conditional", "id": "c",
             "condition": {"version": "1.0", "expression": "{a.output}"},
             "trueBranch": "b", "deps": ["a"]}
        ]))
        .unwrap();

        let mut state = WorkflowState::new("thread-1", None, steps);
        state.record("a", StepResult::success("done"));

        let graph = WorkflowGraph::from_state(&state);

        assert_eq!(graph.nodes.len(), 3);
        let a = graph.nodes.iter().find(|n| n.id == "a").unwrap();
        assert_eq!(a.status, Some(StepStatus::Success));
        let b = graph.nodes.iter().find(|n| n.id == "b").unwrap();
        assert_eq!(b.status, None);

        assert!(graph
            .edges
            .iter()
            .any(|e| e.from == "a" && e.to == "b" && e.kind == EdgeKind::Dependency));
        assert!(graph
            .edges
            .iter()
            .any(|e| e.from == "c" && e.to == "b" && e.kind == EdgeKind::Branch));
    }
}
