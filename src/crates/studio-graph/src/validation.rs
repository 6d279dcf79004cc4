//! Fail-fast workflow validation
//!
//! Runs before any node executes; a failure here guarantees no side
//! effects. Checks are applied in a fixed order:
//!
//! 1. every task step binds a `role` or an `agentId`
//! 2. every `agentId` resolves in the project
//! 3. every `role` resolves project-first, then globally (case-insensitive)
//! 4. every dependency names an existing step, never the step itself
//! 5. the dependency graph is acyclic (the error names the cycle path)
//! 6. container/branch references name existing steps of the right kind
//! 7. `{stepId.field}` template variables name existing steps; references
//!    outside the declared dependencies produce warnings, not errors
//!
//! Binding failures are wrapped in the stable
//! `Agent configuration validation failed: …` message.

use crate::error::{GraphError, Result};
use crate::runner::BindingResolver;
use crate::step::{WorkflowStep, HumanStep, TaskStep};
use crate::template;
use std::collections::{HashMap, HashSet};

/// Non-fatal findings from validation
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

/// Validate a step list against its project bindings
pub async fn validate(
    steps: &[WorkflowStep],
    project_id: Option<&str>,
    resolver: &dyn BindingResolver,
) -> Result<ValidationReport> {
    if steps.is_empty() {
        return Err(GraphError::Validation("workflow has no steps".to_string()));
    }

    let ids: HashSet<&str> = steps.iter().map(|s| s.id()).collect();
    if ids.len() != steps.len() {
        let mut seen = HashSet::new();
        let dup = steps
            .iter()
            .map(|s| s.id())
            .find(|id| !seen.insert(*id))
            .unwrap_or_default();
        return Err(GraphError::Validation(format!("duplicate step id '{dup}'")));
    }

    validate_bindings(steps, project_id, resolver).await?;
    validate_deps(steps, &ids)?;

    if let Some(path) = detect_cycle(steps) {
        return Err(GraphError::Validation(format!(
            "circular dependencies: {}",
            path.join(" → ")
        )));
    }

    validate_references(steps, &ids)?;
    let warnings = validate_templates(steps, &ids)?;

    Ok(ValidationReport { warnings })
}

async fn validate_bindings(
    steps: &[WorkflowStep],
    project_id: Option<&str>,
    resolver: &dyn BindingResolver,
) -> Result<()> {
    for step in steps {
        let WorkflowStep::Task(task) = step else { continue };

        match (&task.agent_id, &task.role) {
            (None, None) => {
                return Err(GraphError::config_validation(format!(
                    "step '{}' must bind a role or an agentId",
                    task.id
                )));
            }
            (Some(agent_id), _) => {
                if !resolver.agent_exists(project_id, agent_id).await {
                    return Err(GraphError::config_validation(format!(
                        "agent '{agent_id}' not found in project"
                    )));
                }
            }
            (None, Some(role)) => {
                if resolver.resolve_role(project_id, role).await.is_none() {
                    return Err(GraphError::config_validation(format!(
                        "no agent found for role {role}"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_deps(steps: &[WorkflowStep], ids: &HashSet<&str>) -> Result<()> {
    for step in steps {
        for dep in step.deps() {
            if dep == step.id() {
                return Err(GraphError::Validation(format!(
                    "step '{}' depends on itself",
                    step.id()
                )));
            }
            if !ids.contains(dep.as_str()) {
                return Err(GraphError::Validation(format!(
                    "step '{}' depends on unknown step '{dep}'",
                    step.id()
                )));
            }
        }
    }
    Ok(())
}

fn validate_references(steps: &[WorkflowStep], ids: &HashSet<&str>) -> Result<()> {
    let by_id: HashMap<&str, &WorkflowStep> = steps.iter().map(|s| (s.id(), s)).collect();

    for step in steps {
        for child in step.referenced_steps() {
            if !ids.contains(child) {
                return Err(GraphError::Validation(format!(
                    "step '{}' references unknown step '{child}'",
                    step.id()
                )));
            }
            // Parallel and loop containers execute their children directly
            // as agent tasks; nesting containers is not supported.
            if matches!(step, WorkflowStep::Parallel(_) | WorkflowStep::Loop(_))
                && !matches!(by_id[child], WorkflowStep::Task(_))
            {
                return Err(GraphError::Validation(format!(
                    "step '{}' references non-task step '{child}'",
                    step.id()
                )));
            }
        }
    }
    Ok(())
}

fn validate_templates(steps: &[WorkflowStep], ids: &HashSet<&str>) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    for step in steps {
        let text = match step {
            WorkflowStep::Task(TaskStep { task, .. }) => task,
            WorkflowStep::Human(HumanStep { prompt, .. }) => prompt,
            _ => continue,
        };

        for reference in template::template_refs(text) {
            if !ids.contains(reference.step_id.as_str()) {
                return Err(GraphError::Validation(format!(
                    "template variable {{{}.{}}} in step '{}' references unknown step '{}'",
                    reference.step_id,
                    reference.field,
                    step.id(),
                    reference.step_id
                )));
            }
            let declared = reference.step_id == step.id()
                || step.deps().iter().any(|d| d == &reference.step_id);
            if !declared {
                warnings.push(format!(
                    "step '{}' reads {{{}.{}}} without declaring '{}' as a dependency",
                    step.id(),
                    reference.step_id,
                    reference.field,
                    reference.step_id
                ));
            }
        }
    }
    Ok(warnings)
}

/// Find a dependency cycle, returning the participating ids in path order
///
/// Depth-first search with a visiting set; the returned path starts and
/// ends on the same id (`["a", "b", "a"]`). `None` for acyclic graphs.
pub fn detect_cycle(steps: &[WorkflowStep]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Visiting,
        Done,
    }

    let deps: HashMap<&str, &[String]> = steps.iter().map(|s| (s.id(), s.deps())).collect();
    let mut marks: HashMap<&str, Mark> = steps.iter().map(|s| (s.id(), Mark::Unvisited)).collect();

    fn visit<'a>(
        id: &'a str,
        deps: &HashMap<&'a str, &'a [String]>,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(id) {
            Some(Mark::Done) | None => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|p| *p == id).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|p| p.to_string()).collect();
                cycle.push(id.to_string());
                return Some(cycle);
            }
            Some(Mark::Unvisited) => {}
        }

        marks.insert(id, Mark::Visiting);
        path.push(id);
        if let Some(step_deps) = deps.get(id) {
            for dep in step_deps.iter() {
                if let Some(cycle) = visit(dep.as_str(), deps, marks, path) {
                    return Some(cycle);
                }
            }
        }
        path.pop();
        marks.insert(id, Mark::Done);
        None
    }

    let mut path = Vec::new();
    for step in steps {
        if let Some(cycle) = visit(step.id(), &deps, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}
