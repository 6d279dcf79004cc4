//! Condition model and evaluation for conditional steps
//!
//! Two wire forms are accepted:
//!
//! - **Structured** - a tree of [`ConditionGroup`]s holding
//!   field/operator/value rules, combined with AND/OR. Fields address prior
//!   step state as `<stepId>.<output|status|response>`.
//! - **Legacy** - a plain string expression carrying `version: "1.0"`,
//!   evaluated over step outputs (`{a.output} == "yes"`,
//!   `{a.output} contains err`, or a bare reference tested for truthiness).
//!
//! Evaluation is pure: it reads the run state and returns a boolean, or a
//! validation error for malformed rules.

use crate::error::{GraphError, Result};
use crate::step::WorkflowState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Condition attached to a conditional step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Condition {
    /// Structured rule tree
    Group(ConditionGroup),
    /// Legacy string expression (`version: "1.0"`)
    Legacy(LegacyCondition),
}

/// Group of rules and nested groups combined with one combinator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionGroup {
    pub combinator: Combinator,
    #[serde(default)]
    pub rules: Vec<ConditionRule>,
    #[serde(default)]
    pub groups: Vec<ConditionGroup>,
}

/// One field/operator/value comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRule {
    /// Address into run state, e.g. `a.output`
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

/// How a group combines its children
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    And,
    Or,
}

/// Rule comparison operators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    StartsWith,
    EndsWith,
    In,
    NotIn,
    Exists,
}

/// Legacy string condition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LegacyCondition {
    pub version: String,
    pub expression: String,
}

impl Condition {
    /// Evaluate against the current run state
    pub fn evaluate(&self, state: &WorkflowState) -> Result<bool> {
        match self {
            Condition::Group(group) => group.evaluate(state),
            Condition::Legacy(legacy) => evaluate_legacy(&legacy.expression, state),
        }
    }
}

impl ConditionGroup {
    fn evaluate(&self, state: &WorkflowState) -> Result<bool> {
        let mut outcomes = Vec::with_capacity(self.rules.len() + self.groups.len());
        for rule in &self.rules {
            outcomes.push(rule.evaluate(state)?);
        }
        for group in &self.groups {
            outcomes.push(group.evaluate(state)?);
        }

        Ok(match self.combinator {
            Combinator::And => outcomes.iter().all(|&b| b),
            Combinator::Or => outcomes.iter().any(|&b| b),
        })
    }
}

impl ConditionRule {
    fn evaluate(&self, state: &WorkflowState) -> Result<bool> {
        let resolved = resolve_field(&self.field, state);

        if self.operator == Operator::Exists {
            return Ok(resolved.is_some());
        }

        // Any other operator on a missing field is false, not an error:
        // the referenced step may legitimately not have run.
        let Some(actual) = resolved else {
            return Ok(false);
        };

        let expected = &self.value;
        Ok(match self.operator {
            Operator::Eq => json_eq(&actual, expected),
            Operator::Neq => !json_eq(&actual, expected),
            Operator::Lt => numeric_cmp(&actual, expected)?.map(|o| o.is_lt()).unwrap_or(false),
            Operator::Le => numeric_cmp(&actual, expected)?.map(|o| o.is_le()).unwrap_or(false),
            Operator::Gt => numeric_cmp(&actual, expected)?.map(|o| o.is_gt()).unwrap_or(false),
            Operator::Ge => numeric_cmp(&actual, expected)?.map(|o| o.is_ge()).unwrap_or(false),
            Operator::Contains => as_text(&actual).contains(as_text(expected).as_str()),
            Operator::StartsWith => as_text(&actual).starts_with(as_text(expected).as_str()),
            Operator::EndsWith => as_text(&actual).ends_with(as_text(expected).as_str()),
            Operator::In => membership(&actual, expected)?,
            Operator::NotIn => !membership(&actual, expected)?,
            Operator::Exists => unreachable!("handled above"),
        })
    }
}

/// Resolve `<stepId>.<field>` against the run state
fn resolve_field(field: &str, state: &WorkflowState) -> Option<Value> {
    let (step_id, attr) = field.split_once('.')?;
    match attr {
        "output" => state.step_outputs.get(step_id).cloned().map(Value::String),
        "response" => state.step_results.get(step_id).map(|r| Value::String(r.response.clone())),
        "status" => state
            .step_results
            .get(step_id)
            .and_then(|r| serde_json::to_value(r.status).ok()),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality with numeric coercion so `"5"` and `5` compare equal
fn json_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => as_text(actual) == as_text(expected),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn numeric_cmp(actual: &Value, expected: &Value) -> Result<Option<std::cmp::Ordering>> {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => Ok(a.partial_cmp(&b)),
        _ => Ok(None),
    }
}

fn membership(actual: &Value, expected: &Value) -> Result<bool> {
    let Value::Array(candidates) = expected else {
        return Err(GraphError::Validation(format!(
            "operator 'in' requires an array value, got {expected}"
        )));
    };
    Ok(candidates.iter().any(|candidate| json_eq(actual, candidate)))
}

/// Evaluate a legacy `version: "1.0"` string expression
///
/// Supported forms: `lhs == rhs`, `lhs != rhs`, `lhs contains rhs`, and a
/// bare operand tested for truthiness (non-empty, not `"false"`/`"0"`).
/// Operands are `{stepId.field}` references or (optionally quoted) literals.
fn evaluate_legacy(expression: &str, state: &WorkflowState) -> Result<bool> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(GraphError::Validation("empty legacy condition expression".to_string()));
    }

    for (token, negate) in [("==", false), ("!=", true)] {
        if let Some((lhs, rhs)) = expression.split_once(token) {
            let equal = operand(lhs, state) == operand(rhs, state);
            return Ok(equal != negate);
        }
    }

    if let Some((lhs, rhs)) = expression.split_once(" contains ") {
        return Ok(operand(lhs, state).contains(&operand(rhs, state)));
    }

    let value = operand(expression, state);
    Ok(!value.is_empty() && value != "false" && value != "0")
}

/// Resolve a legacy operand: reference, quoted literal, or bare literal
fn operand(raw: &str, state: &WorkflowState) -> String {
    let raw = raw.trim();
    if let Some(reference) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        return resolve_field(reference, state).map(|v| as_text(&v)).unwrap_or_default();
    }
    raw.trim_matches(|c| c == '"' || c == '\'').to_string()
}
