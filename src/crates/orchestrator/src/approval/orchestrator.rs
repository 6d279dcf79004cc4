//! Approval lifecycle orchestration
//!
//! [`ApprovalOrchestrator`] owns every approval record and its state
//! machine:
//!
//! ```text
//! pending ──approved──▶ approved   (terminal)
//!    │    ──rejected──▶ rejected   (terminal)
//!    │    ──cancel   ──▶ cancelled (terminal)
//!    └── (expiresAt passed) ──▶ expired, or approved when
//!                               autoApproveAfterTimeout is set
//! ```
//!
//! Waiters block on a per-approval `Notify` signalled by
//! `process_decision`/`cancel_approval`, with a slow poll as the fallback
//! for decisions arriving through external stores. Resolutions emit
//! `human_approval_processed` / `human_approval_cancelled` events.

use crate::approval::types::{Approval, ApprovalStatus, CreateApprovalRequest, Decision};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

/// Poll cadence while waiting on a finite budget
const WAIT_POLL: Duration = Duration::from_secs(2);
/// Poll cadence while waiting without a budget
const WAIT_POLL_INFINITE: Duration = Duration::from_secs(5);

/// Result type for approval operations
pub type Result<T> = std::result::Result<T, ApprovalError>;

/// Errors from the approval state machine
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("Approval {0} not found")]
    NotFound(String),

    #[error("Approval {id} is already {status:?}")]
    AlreadyResolved { id: String, status: ApprovalStatus },

    #[error("Approval {0} was cancelled")]
    Cancelled(String),

    #[error("Approval {id} timed out after {seconds} seconds")]
    Timeout { id: String, seconds: u64 },
}

/// Resolution events for observers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ApprovalEvent {
    #[serde(rename = "human_approval_processed")]
    Processed { approval: Approval },

    #[serde(rename = "human_approval_cancelled")]
    Cancelled { approval: Approval },
}

/// Filter for listing approvals
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalFilter {
    pub status: Option<ApprovalStatus>,
    pub project_id: Option<String>,
    pub thread_id: Option<String>,
}

/// Creates, resolves, expires and cancels approvals
pub struct ApprovalOrchestrator {
    approvals: RwLock<HashMap<String, Approval>>,
    notifiers: StdMutex<HashMap<String, Arc<Notify>>>,
    events: tokio::sync::broadcast::Sender<ApprovalEvent>,
}

impl Default for ApprovalOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl ApprovalOrchestrator {
    pub fn new() -> Self {
        let (events, _) = tokio::sync::broadcast::channel(256);
        Self {
            approvals: RwLock::new(HashMap::new()),
            notifiers: StdMutex::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to resolution events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ApprovalEvent> {
        self.events.subscribe()
    }

    /// Open a new pending approval
    pub async fn create_approval(&self, request: CreateApprovalRequest) -> Approval {
        let approval = Approval::open(request);
        info!(approval_id = %approval.approval_id, thread_id = %approval.thread_id,
            risk = ?approval.risk_level, "Approval created");
        self.approvals
            .write()
            .await
            .insert(approval.approval_id.clone(), approval.clone());
        approval
    }

    /// Fetch one approval, applying lazy expiry first
    pub async fn get_approval(&self, approval_id: &str) -> Result<Approval> {
        self.expire_if_due(approval_id).await;
        self.approvals
            .read()
            .await
            .get(approval_id)
            .cloned()
            .ok_or_else(|| ApprovalError::NotFound(approval_id.to_string()))
    }

    /// Apply a human decision to a pending approval
    pub async fn process_decision(
        &self,
        approval_id: &str,
        decision: Decision,
        decided_by: &str,
    ) -> Result<Approval> {
        self.expire_if_due(approval_id).await;

        let approval = {
            let mut approvals = self.approvals.write().await;
            let approval = approvals
                .get_mut(approval_id)
                .ok_or_else(|| ApprovalError::NotFound(approval_id.to_string()))?;
            if approval.status.is_terminal() {
                return Err(ApprovalError::AlreadyResolved {
                    id: approval_id.to_string(),
                    status: approval.status,
                });
            }

            approval.status = match decision {
                Decision::Approved => ApprovalStatus::Approved,
                Decision::Rejected => ApprovalStatus::Rejected,
            };
            approval.resolved_at = Some(Utc::now());
            approval.resolved_by = Some(decided_by.to_string());
            approval.clone()
        };

        info!(approval_id = %approval_id, ?decision, decided_by, "Approval resolved");
        self.notify(approval_id);
        let _ = self.events.send(ApprovalEvent::Processed { approval: approval.clone() });
        Ok(approval)
    }

    /// Cancel a pending approval
    pub async fn cancel_approval(&self, approval_id: &str, cancelled_by: &str) -> Result<Approval> {
        let approval = {
            let mut approvals = self.approvals.write().await;
            let approval = approvals
                .get_mut(approval_id)
                .ok_or_else(|| ApprovalError::NotFound(approval_id.to_string()))?;
            if approval.status.is_terminal() {
                return Err(ApprovalError::AlreadyResolved {
                    id: approval_id.to_string(),
                    status: approval.status,
                });
            }

            approval.status = ApprovalStatus::Cancelled;
            approval.resolved_at = Some(Utc::now());
            approval.resolved_by = Some(cancelled_by.to_string());
            approval.clone()
        };

        info!(approval_id = %approval_id, cancelled_by, "Approval cancelled");
        self.notify(approval_id);
        let _ = self.events.send(ApprovalEvent::Cancelled { approval: approval.clone() });
        Ok(approval)
    }

    /// List approvals matching a filter
    pub async fn list_approvals(&self, filter: &ApprovalFilter) -> Vec<Approval> {
        self.approvals
            .read()
            .await
            .values()
            .filter(|a| filter.status.map(|s| a.status == s).unwrap_or(true))
            .filter(|a| {
                filter
                    .project_id
                    .as_deref()
                    .map(|p| a.project_id.as_deref() == Some(p))
                    .unwrap_or(true)
            })
            .filter(|a| {
                filter
                    .thread_id
                    .as_deref()
                    .map(|t| a.thread_id == t)
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// Pending approvals for one project
    pub async fn get_pending_for_project(&self, project_id: &str) -> Vec<Approval> {
        self.list_approvals(&ApprovalFilter {
            status: Some(ApprovalStatus::Pending),
            project_id: Some(project_id.to_string()),
            thread_id: None,
        })
        .await
    }

    /// Sweep every pending approval past its deadline
    ///
    /// Expired records transition to `expired`, or straight to `approved`
    /// when `auto_approve_after_timeout` is set. Returns how many records
    /// changed state.
    pub async fn process_expired_approvals(&self) -> usize {
        let now = Utc::now();
        let mut transitioned = Vec::new();

        {
            let mut approvals = self.approvals.write().await;
            for approval in approvals.values_mut() {
                if !approval.is_expired(now) {
                    continue;
                }
                approval.status = if approval.auto_approve_after_timeout {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Expired
                };
                approval.resolved_at = Some(now);
                approval.resolved_by = Some("system:timeout".to_string());
                transitioned.push(approval.clone());
            }
        }

        for approval in &transitioned {
            debug!(approval_id = %approval.approval_id, status = ?approval.status, "Approval expired");
            self.notify(&approval.approval_id);
            let _ = self.events.send(ApprovalEvent::Processed { approval: approval.clone() });
        }
        transitioned.len()
    }

    /// Start a periodic expiry sweep
    pub fn start_expiry_sweep(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                orchestrator.process_expired_approvals().await;
            }
        })
    }

    /// Block until the approval resolves
    ///
    /// Returns `Ok(true)` for approved, `Ok(false)` for rejected. A
    /// cancelled approval is an error, as is running out of budget with
    /// `fail` behaviour. With `auto_approve` behaviour an exhausted budget
    /// resolves the record approved and returns `Ok(true)`; `infinite`
    /// ignores the budget entirely.
    pub async fn wait_for_decision(
        &self,
        approval_id: &str,
        timeout_seconds: u64,
        behavior: studio_graph::TimeoutBehavior,
    ) -> Result<bool> {
        use studio_graph::TimeoutBehavior;

        let infinite = behavior == TimeoutBehavior::Infinite || timeout_seconds == 0;
        let poll = if infinite { WAIT_POLL_INFINITE } else { WAIT_POLL };
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_seconds);
        let notify = self.notifier(approval_id);

        loop {
            match self.get_approval(approval_id).await?.status {
                ApprovalStatus::Approved => return Ok(true),
                ApprovalStatus::Rejected => return Ok(false),
                ApprovalStatus::Cancelled => return Err(ApprovalError::Cancelled(approval_id.to_string())),
                ApprovalStatus::Expired => {
                    return Err(ApprovalError::Timeout {
                        id: approval_id.to_string(),
                        seconds: timeout_seconds,
                    })
                }
                ApprovalStatus::Pending => {}
            }

            if !infinite && tokio::time::Instant::now() >= deadline {
                return match behavior {
                    TimeoutBehavior::AutoApprove => {
                        self.process_decision(approval_id, Decision::Approved, "system:auto-approve")
                            .await?;
                        Ok(true)
                    }
                    _ => Err(ApprovalError::Timeout {
                        id: approval_id.to_string(),
                        seconds: timeout_seconds,
                    }),
                };
            }

            // Decision notification or the poll fallback, whichever first
            let _ = tokio::time::timeout(poll, notify.notified()).await;
        }
    }

    fn notifier(&self, approval_id: &str) -> Arc<Notify> {
        self.notifiers
            .lock()
            .expect("notifier lock poisoned")
            .entry(approval_id.to_string())
            .or_default()
            .clone()
    }

    fn notify(&self, approval_id: &str) {
        if let Some(notify) = self
            .notifiers
            .lock()
            .expect("notifier lock poisoned")
            .get(approval_id)
        {
            notify.notify_waiters();
        }
    }

    /// Lazily transition one record if its deadline has passed
    async fn expire_if_due(&self, approval_id: &str) {
        let now = Utc::now();
        let expired = {
            let mut approvals = self.approvals.write().await;
            match approvals.get_mut(approval_id) {
                Some(approval) if approval.is_expired(now) => {
                    approval.status = if approval.auto_approve_after_timeout {
                        ApprovalStatus::Approved
                    } else {
                        ApprovalStatus::Expired
                    };
                    approval.resolved_at = Some(now);
                    approval.resolved_by = Some("system:timeout".to_string());
                    Some(approval.clone())
                }
                _ => None,
            }
        };

        if let Some(approval) = expired {
            self.notify(&approval.approval_id);
            let _ = self.events.send(ApprovalEvent::Processed { approval });
        }
    }
}
