//! Template variable substitution
//!
//! All `{stepId.field}` handling lives here so substitution behaves the
//! same everywhere it appears (task prompts, human prompts, legacy
//! conditions). Supported fields are `output`, `response` and `status`.
//! References to steps with no recorded value are left untouched; the
//! validator decides beforehand whether such a reference is an error
//! (step does not exist) or a warning (exists but not a declared
//! dependency).
//!
//! Loop iterations use the simpler `{loopVar}` form, replaced with the
//! current item before the iteration's steps run.

use crate::step::WorkflowState;
use regex::Regex;
use std::sync::OnceLock;

/// A parsed `{stepId.field}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub step_id: String,
    pub field: String,
}

fn template_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_-]+)\.([A-Za-z0-9_]+)\}").expect("template regex"))
}

/// Extract every `{stepId.field}` reference in order of appearance
pub fn template_refs(text: &str) -> Vec<TemplateRef> {
    template_re()
        .captures_iter(text)
        .map(|caps| TemplateRef {
            step_id: caps[1].to_string(),
            field: caps[2].to_string(),
        })
        .collect()
}

/// Substitute `{stepId.field}` references against the run state
pub fn substitute(text: &str, state: &WorkflowState) -> String {
    template_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let step_id = &caps[1];
            let resolved = match &caps[2] {
                "output" => state.step_outputs.get(step_id).cloned(),
                "response" => state.step_results.get(step_id).map(|r| r.response.clone()),
                "status" => state
                    .step_results
                    .get(step_id)
                    .and_then(|r| serde_json::to_value(r.status).ok())
                    .and_then(|v| v.as_str().map(str::to_string)),
                _ => None,
            };
            resolved.unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Substitute the loop variable (`{loopVar}`) with the current item
pub fn substitute_loop_var(text: &str, loop_var: &str, value: &str) -> String {
    text.replace(&format!("{{{loop_var}}}"), value)
}

/// Per-iteration id for a step executed inside a loop
pub fn iteration_step_id(step_id: &str, loop_var: &str, value: &str) -> String {
    format!("{step_id}_{loop_var}_{value}")
}
