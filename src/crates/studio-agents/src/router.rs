//! Message routing: mentions, broadcast, dependency-ordered batches
//!
//! Parses `@target content` mentions out of free text and enforces the
//! delivery semantics: fire-and-forget, synchronous wait on the correlated
//! response, project broadcast, and batch dispatch with a dependency DAG,
//! bounded concurrency and `all`/`any`/`none` wait strategies.
//!
//! The router never touches the registry or the process table directly; it
//! resolves and revives targets through the narrow [`AgentLocator`]
//! capability and sends through [`MessageDelivery`], both injectable for
//! tests.

use crate::error::{AgentError, Result};
use crate::ipc::IpcClient;
use crate::manager::AgentLocator;
use crate::types::{AgentProcess, AgentStatus};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

/// Broadcast tokens: a mention of everyone in the project
const BROADCAST_TARGETS: [&str; 2] = ["all", "team"];

/// Default batch concurrency
const DEFAULT_CONCURRENCY: usize = 2;

/// Default per-message wait budget when none is configured
const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// One parsed `@target content` token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub target: String,
    pub content: String,
}

fn mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@(\w+)").expect("mention regex"))
}

/// Extract mentions in order of appearance
///
/// Each mention's content runs up to the next mention or the end of the
/// string, so the simple `@target rest of line` form captures the whole
/// tail.
pub fn parse_mentions(text: &str) -> Vec<Mention> {
    let matches: Vec<(usize, usize, String)> = mention_re()
        .captures_iter(text)
        .map(|caps| {
            let whole = caps.get(0).expect("match 0");
            (whole.start(), whole.end(), caps[1].to_string())
        })
        .collect();

    matches
        .iter()
        .enumerate()
        .map(|(i, (_, end, target))| {
            let content_end = matches.get(i + 1).map(|(next_start, _, _)| *next_start).unwrap_or(text.len());
            Mention {
                target: target.clone(),
                content: text[*end..content_end].trim().to_string(),
            }
        })
        .collect()
}

pub fn has_mentions(text: &str) -> bool {
    mention_re().is_match(text)
}

/// True when the first mention targets the whole project
pub fn is_broadcast(text: &str) -> bool {
    parse_mentions(text)
        .first()
        .map(|m| BROADCAST_TARGETS.contains(&m.target.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Transport seam: delivers one message to a resolved agent
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    /// Send `content` to `target`; with `wait` set, block for the
    /// correlated response and return its text
    async fn deliver(
        &self,
        from: &str,
        target: &AgentProcess,
        content: &str,
        project_id: Option<String>,
        wait: Option<Duration>,
    ) -> Result<Option<String>>;
}

/// Socket-backed delivery with a single retry on transport failure
pub struct IpcDelivery {
    client: IpcClient,
}

impl IpcDelivery {
    pub fn new(client: IpcClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageDelivery for IpcDelivery {
    async fn deliver(
        &self,
        from: &str,
        target: &AgentProcess,
        content: &str,
        project_id: Option<String>,
        wait: Option<Duration>,
    ) -> Result<Option<String>> {
        let send = || async {
            match wait {
                Some(timeout) => self
                    .client
                    .send_and_wait(from, &target.agent_id, content, project_id.clone(), timeout)
                    .await
                    .map(|reply| Some(reply.content_text())),
                None => self
                    .client
                    .send_mention(from, &target.agent_id, content, project_id.clone())
                    .await
                    .map(|()| None),
            }
        };

        match send().await {
            Err(AgentError::Transport(first)) => {
                debug!(target = %target.agent_id, error = %first, "Transport failure, retrying once");
                send().await
            }
            other => other,
        }
    }
}

/// Result of routing one free-text message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOutcome {
    pub routed: bool,
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub responses: HashMap<String, String>,
}

/// Result of a project broadcast
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastOutcome {
    pub success: Vec<String>,
    pub failed: Vec<String>,
}

/// One message inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMessage {
    pub id: String,
    pub target: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Sibling message ids that must succeed before this one runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// How long the batch call blocks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaitStrategy {
    /// Wait for every message to terminate
    #[default]
    All,
    /// Return on the first success, cancelling the rest best-effort
    Any,
    /// Fire-and-forget: return at dispatch time
    None,
}

/// Batch call options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOptions {
    #[serde(default)]
    pub wait_strategy: WaitStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Terminal state of one batch message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BatchMessageStatus {
    Success,
    Failed,
    Aborted,
}

/// Outcome of one batch message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMessageOutcome {
    pub id: String,
    pub status: BatchMessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl BatchMessageOutcome {
    fn success(id: &str, response: Option<String>, duration_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            status: BatchMessageStatus::Success,
            response,
            error: None,
            duration_ms,
        }
    }

    fn failed(id: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            status: BatchMessageStatus::Failed,
            response: None,
            error: Some(error.into()),
            duration_ms,
        }
    }

    fn aborted(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: BatchMessageStatus::Aborted,
            response: None,
            error: Some("aborted".to_string()),
            duration_ms: 0,
        }
    }
}

/// Outcome of a whole batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub batch_id: String,
    pub wait_strategy: WaitStrategy,
    pub results: Vec<BatchMessageOutcome>,
    pub duration_ms: u64,
}

/// Parses mentions and enforces delivery semantics
pub struct MessageRouter {
    locator: Arc<dyn AgentLocator>,
    delivery: Arc<dyn MessageDelivery>,
    batches: Arc<StdMutex<HashMap<String, watch::Sender<bool>>>>,
}

impl MessageRouter {
    pub fn new(locator: Arc<dyn AgentLocator>, delivery: Arc<dyn MessageDelivery>) -> Self {
        Self {
            locator,
            delivery,
            batches: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    /// Route every mention in a free-text message
    ///
    /// Offline targets are respawned and awaited online before delivery.
    /// With `wait` set, blocks for each target's correlated response.
    pub async fn route(
        &self,
        message: &str,
        from_agent_id: &str,
        project_id: Option<&str>,
        wait: Option<Duration>,
    ) -> Result<RouteOutcome> {
        let mentions = parse_mentions(message);
        if mentions.is_empty() {
            return Ok(RouteOutcome::default());
        }

        if is_broadcast(message) {
            let project = project_id
                .ok_or_else(|| AgentError::Custom("broadcast requires a project".to_string()))?;
            let broadcast = self.broadcast_to_project(message, from_agent_id, project).await?;
            return Ok(RouteOutcome {
                routed: !broadcast.success.is_empty(),
                targets: broadcast.success,
                responses: HashMap::new(),
            });
        }

        let mut outcome = RouteOutcome { routed: true, ..Default::default() };
        for mention in mentions {
            let agent = self.resolve_alive(&mention.target, project_id).await?;
            let response = self
                .delivery
                .deliver(from_agent_id, &agent, &mention.content, project_id.map(str::to_string), wait)
                .await?;
            self.locator.mark_busy(&agent.agent_id).await?;

            if let Some(text) = response {
                outcome.responses.insert(agent.agent_id.clone(), text);
            }
            outcome.targets.push(agent.agent_id);
        }
        Ok(outcome)
    }

    /// Fan a message out to every online agent in the project but the sender
    pub async fn broadcast_to_project(
        &self,
        message: &str,
        from_agent_id: &str,
        project_id: &str,
    ) -> Result<BroadcastOutcome> {
        let content = parse_mentions(message)
            .into_iter()
            .next()
            .map(|m| m.content)
            .unwrap_or_else(|| message.to_string());

        let mut outcome = BroadcastOutcome::default();
        for agent in self.locator.list_online(project_id).await? {
            if agent.agent_id == from_agent_id {
                continue;
            }
            match self
                .delivery
                .deliver(from_agent_id, &agent, &content, Some(project_id.to_string()), None)
                .await
            {
                Ok(_) => outcome.success.push(agent.agent_id),
                Err(e) => {
                    warn!(target = %agent.agent_id, error = %e, "Broadcast delivery failed");
                    outcome.failed.push(agent.agent_id);
                }
            }
        }
        Ok(outcome)
    }

    /// Dispatch a batch of messages respecting their dependency DAG
    pub async fn send_batch(&self, messages: Vec<BatchMessage>, options: BatchOptions) -> Result<BatchOutcome> {
        validate_batch(&messages)?;

        let batch_id = Uuid::new_v4().to_string();
        let (abort_tx, abort_rx) = watch::channel(false);
        self.batches
            .lock()
            .expect("batch map lock poisoned")
            .insert(batch_id.clone(), abort_tx);

        let started = Instant::now();
        let outcome = match options.wait_strategy {
            WaitStrategy::None => {
                // Record success at dispatch time; actual sends continue in
                // the background and their failures are only logged.
                let results = messages
                    .iter()
                    .map(|m| BatchMessageOutcome::success(&m.id, None, 0))
                    .collect();
                self.dispatch_detached(messages, batch_id.clone(), abort_rx);
                BatchOutcome {
                    batch_id: batch_id.clone(),
                    wait_strategy: WaitStrategy::None,
                    results,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            strategy => {
                let results = self.run_waves(&messages, &options, abort_rx).await;
                BatchOutcome {
                    batch_id: batch_id.clone(),
                    wait_strategy: strategy,
                    results,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };

        if options.wait_strategy != WaitStrategy::None {
            self.batches.lock().expect("batch map lock poisoned").remove(&batch_id);
        }
        Ok(outcome)
    }

    /// Cancel a batch by id; unknown ids are not found
    pub fn abort_batch(&self, batch_id: &str) -> Result<()> {
        let mut batches = self.batches.lock().expect("batch map lock poisoned");
        match batches.remove(batch_id) {
            Some(tx) => {
                let _ = tx.send(true);
                Ok(())
            }
            None => Err(AgentError::NotFound(format!("batch {batch_id}"))),
        }
    }

    /// Execute topological waves under the concurrency limit
    async fn run_waves(
        &self,
        messages: &[BatchMessage],
        options: &BatchOptions,
        abort: watch::Receiver<bool>,
    ) -> Vec<BatchMessageOutcome> {
        let waves = topological_waves(messages);
        let semaphore = Arc::new(Semaphore::new(options.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1)));
        let by_id: HashMap<&str, &BatchMessage> = messages.iter().map(|m| (m.id.as_str(), m)).collect();
        let mut results: HashMap<String, BatchMessageOutcome> = HashMap::new();
        let mut stop = false;

        for wave in waves {
            if stop || *abort.borrow() {
                break;
            }

            // Messages whose dependencies did not succeed fail without
            // dispatching
            let (runnable, blocked): (Vec<&BatchMessage>, Vec<&BatchMessage>) =
                wave.iter().map(|id| by_id[id.as_str()]).partition(|m| {
                    m.dependencies.iter().all(|d| {
                        results
                            .get(d)
                            .map(|r| r.status == BatchMessageStatus::Success)
                            .unwrap_or(false)
                    })
                });
            for message in blocked {
                results.insert(
                    message.id.clone(),
                    BatchMessageOutcome::failed(&message.id, "dependency did not succeed", 0),
                );
            }

            let futures = runnable.iter().map(|message| {
                let semaphore = Arc::clone(&semaphore);
                let mut abort = abort.clone();
                let timeout = message
                    .timeout_ms
                    .or(options.timeout_ms)
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_MESSAGE_TIMEOUT);
                async move {
                    let _permit = semaphore.acquire().await.expect("semaphore closed");
                    if *abort.borrow() {
                        return BatchMessageOutcome::aborted(&message.id);
                    }

                    let started = Instant::now();
                    let sent = tokio::select! {
                        sent = tokio::time::timeout(timeout, self.dispatch_one(message, Some(timeout))) => {
                            sent.unwrap_or_else(|_| Err(AgentError::Timeout {
                                operation: format!("message '{}'", message.id),
                                duration_ms: timeout.as_millis() as u64,
                            }))
                        }
                        _ = abort.wait_for(|a| *a) => return BatchMessageOutcome::aborted(&message.id),
                    };
                    let duration_ms = started.elapsed().as_millis() as u64;

                    match sent {
                        Ok(response) => BatchMessageOutcome::success(&message.id, response, duration_ms),
                        Err(e) => BatchMessageOutcome::failed(&message.id, e.to_string(), duration_ms),
                    }
                }
            });

            let wave_results = futures::future::join_all(futures).await;
            let any_success = wave_results.iter().any(|r| r.status == BatchMessageStatus::Success);
            for result in wave_results {
                results.insert(result.id.clone(), result);
            }

            if options.wait_strategy == WaitStrategy::Any && any_success {
                stop = true;
            }
        }

        // Anything never reached is aborted
        messages
            .iter()
            .map(|m| {
                results
                    .remove(m.id.as_str())
                    .unwrap_or_else(|| BatchMessageOutcome::aborted(&m.id))
            })
            .collect()
    }

    async fn dispatch_one(&self, message: &BatchMessage, wait: Option<Duration>) -> Result<Option<String>> {
        let agent = self.resolve_alive(&message.target, message.project_id.as_deref()).await?;
        let response = self
            .delivery
            .deliver("batch", &agent, &message.content, message.project_id.clone(), wait)
            .await?;
        self.locator.mark_busy(&agent.agent_id).await?;
        Ok(response)
    }

    /// Background execution for `none` batches
    ///
    /// Delivery failures are only logged; the caller already received its
    /// dispatch-time results. The batch entry is dropped once every send
    /// completed or the batch was aborted.
    fn dispatch_detached(&self, messages: Vec<BatchMessage>, batch_id: String, abort: watch::Receiver<bool>) {
        let locator = Arc::clone(&self.locator);
        let delivery = Arc::clone(&self.delivery);
        let batches = Arc::clone(&self.batches);
        tokio::spawn(async move {
            for message in messages {
                if *abort.borrow() {
                    break;
                }
                let agent = match locator.find(&message.target, message.project_id.as_deref()).await {
                    Ok(agent) => agent,
                    Err(e) => {
                        warn!(batch_id = %batch_id, id = %message.id, error = %e, "Batch target not found");
                        continue;
                    }
                };
                if let Err(e) = delivery
                    .deliver("batch", &agent, &message.content, message.project_id.clone(), None)
                    .await
                {
                    warn!(batch_id = %batch_id, id = %message.id, error = %e, "Batch delivery failed");
                }
            }
            batches.lock().expect("batch map lock poisoned").remove(&batch_id);
        });
    }

    async fn resolve_alive(&self, target: &str, project_id: Option<&str>) -> Result<AgentProcess> {
        let agent = self.locator.find(target, project_id).await?;
        if agent.status == AgentStatus::Offline || agent.pid.is_none() {
            debug!(agent_id = %agent.agent_id, "Target offline, reviving before delivery");
            return self.locator.ensure_alive(&agent.agent_id).await;
        }
        Ok(agent)
    }
}

/// Reject empty batches, duplicate ids, unknown dependencies and cycles
fn validate_batch(messages: &[BatchMessage]) -> Result<()> {
    if messages.is_empty() {
        return Err(AgentError::InvalidBatch("batch contains no messages".to_string()));
    }

    let ids: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    if ids.len() != messages.len() {
        return Err(AgentError::InvalidBatch("duplicate message ids".to_string()));
    }
    for message in messages {
        for dep in &message.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(AgentError::InvalidBatch(format!(
                    "message '{}' depends on unknown message '{dep}'",
                    message.id
                )));
            }
            if dep == &message.id {
                return Err(AgentError::InvalidBatch(format!(
                    "message '{}' depends on itself",
                    message.id
                )));
            }
        }
    }

    if topological_waves(messages).iter().map(Vec::len).sum::<usize>() != messages.len() {
        return Err(AgentError::InvalidBatch("dependency cycle detected".to_string()));
    }
    Ok(())
}

/// Kahn's algorithm, returning messages grouped into dependency waves
///
/// Messages caught in a cycle never reach in-degree zero and are simply
/// absent from the output, which is how [`validate_batch`] detects them.
fn topological_waves(messages: &[BatchMessage]) -> Vec<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> =
        messages.iter().map(|m| (m.id.as_str(), m.dependencies.len())).collect();
    let mut dependants: HashMap<&str, Vec<&str>> = HashMap::new();
    for message in messages {
        for dep in &message.dependencies {
            dependants.entry(dep.as_str()).or_default().push(message.id.as_str());
        }
    }

    let mut waves = Vec::new();
    let mut ready: Vec<&str> = messages
        .iter()
        .filter(|m| in_degree[m.id.as_str()] == 0)
        .map(|m| m.id.as_str())
        .collect();

    while !ready.is_empty() {
        waves.push(ready.iter().map(|id| id.to_string()).collect());
        let mut next = Vec::new();
        for id in ready {
            for dependant in dependants.get(id).into_iter().flatten() {
                let degree = in_degree.get_mut(dependant).expect("known id");
                *degree -= 1;
                if *degree == 0 {
                    next.push(*dependant);
                }
            }
        }
        ready = next;
    }
    waves
}
