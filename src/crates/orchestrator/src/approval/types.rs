//! Approval records and risk inference
//!
//! An [`Approval`] is the durable side of a human-in-the-loop gate: one
//! record per pending decision, with an expiry deadline derived from the
//! step's timeout and a terminal state set exactly once.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use studio_graph::RiskLevel;
use uuid::Uuid;

/// Lifecycle of an approval record
///
/// Only `pending` is mutable; every other state is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    Cancelled,
}

impl ApprovalStatus {
    pub fn is_terminal(&self) -> bool {
        *self != ApprovalStatus::Pending
    }
}

/// A human decision on a pending approval
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

/// One human-in-the-loop gate instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub approval_id: String,
    pub thread_id: String,
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    pub prompt: String,
    /// Step-history snapshot shown to the approver
    #[serde(default)]
    pub context_data: Value,
    pub risk_level: RiskLevel,
    pub requested_at: DateTime<Utc>,
    pub timeout_seconds: u64,
    /// Set iff `timeout_seconds > 0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub status: ApprovalStatus,
    /// Set iff `status` is terminal; never earlier than `requested_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default = "default_true")]
    pub approval_required: bool,
    #[serde(default)]
    pub auto_approve_after_timeout: bool,
}

fn default_true() -> bool {
    true
}

/// Request to open a new approval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApprovalRequest {
    pub thread_id: String,
    pub step_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub context_data: Value,
    /// Inferred from the prompt when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(default)]
    pub timeout_seconds: u64,
    #[serde(default = "default_true")]
    pub approval_required: bool,
    #[serde(default)]
    pub auto_approve_after_timeout: bool,
}

impl Approval {
    /// Open a fresh pending record from a request
    pub fn open(request: CreateApprovalRequest) -> Self {
        let requested_at = Utc::now();
        let expires_at = (request.timeout_seconds > 0)
            .then(|| requested_at + ChronoDuration::seconds(request.timeout_seconds as i64));
        let risk_level = request
            .risk_level
            .unwrap_or_else(|| infer_risk_level(&request.prompt));

        Self {
            approval_id: Uuid::new_v4().to_string(),
            thread_id: request.thread_id,
            step_id: request.step_id,
            project_id: request.project_id,
            workflow_name: request.workflow_name,
            prompt: request.prompt,
            context_data: request.context_data,
            risk_level,
            requested_at,
            timeout_seconds: request.timeout_seconds,
            expires_at,
            status: ApprovalStatus::Pending,
            resolved_at: None,
            resolved_by: None,
            approval_required: request.approval_required,
            auto_approve_after_timeout: request.auto_approve_after_timeout,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ApprovalStatus::Pending
            && self.expires_at.map(|deadline| now >= deadline).unwrap_or(false)
    }
}

const CRITICAL_KEYWORDS: [&str; 6] = ["database", "payment", "billing", "security", "admin", "root"];
const HIGH_KEYWORDS: [&str; 6] = ["delete", "remove", "production", "deploy", "publish", "release"];
const READ_VERBS: [&str; 7] = ["read", "list", "view", "show", "display", "inspect", "fetch"];

/// Classify a gate's risk from its prompt text
///
/// Critical keywords dominate high ones; a prompt made of purely
/// read-like verbs is low; everything else lands on medium.
pub fn infer_risk_level(text: &str) -> RiskLevel {
    let lowered = text.to_lowercase();

    if CRITICAL_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return RiskLevel::Critical;
    }
    if HIGH_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return RiskLevel::High;
    }
    if READ_VERBS.iter().any(|kw| lowered.contains(kw)) {
        return RiskLevel::Low;
    }
    RiskLevel::Medium
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str, timeout_seconds: u64) -> CreateApprovalRequest {
        CreateApprovalRequest {
            thread_id: "thread-1".to_string(),
            step_id: "h".to_string(),
            project_id: None,
            workflow_name: None,
            prompt: prompt.to_string(),
            context_data: Value::Null,
            risk_level: None,
            timeout_seconds,
            approval_required: true,
            auto_approve_after_timeout: false,
        }
    }

    #[test]
    fn test_expires_at_derived_from_timeout() {
        let approval = Approval::open(request("ok?", 60));
        let expires = approval.expires_at.unwrap();
        assert_eq!((expires - approval.requested_at).num_seconds(), 60);

        let unbounded = Approval::open(request("ok?", 0));
        assert!(unbounded.expires_at.is_none());
    }

    #[test]
    fn test_risk_inference() {
        assert_eq!(infer_risk_level("drop the database table"), RiskLevel::Critical);
        assert_eq!(infer_risk_level("deploy to production"), RiskLevel::High);
        assert_eq!(infer_risk_level("list the open tickets"), RiskLevel::Low);
        assert_eq!(infer_risk_level("rename the module"), RiskLevel::Medium);
        // Critical keywords win over high ones
        assert_eq!(infer_risk_level("delete the payment records"), RiskLevel::Critical);
    }

    #[test]
    fn test_explicit_risk_level_wins() {
        let mut req = request("list files", 0);
        req.risk_level = Some(RiskLevel::High);
        assert_eq!(Approval::open(req).risk_level, RiskLevel::High);
    }

    #[test]
    fn test_is_expired() {
        let approval = Approval::open(request("ok?", 1));
        assert!(!approval.is_expired(approval.requested_at));
        assert!(approval.is_expired(approval.requested_at + ChronoDuration::seconds(2)));
    }
}
