//! Agent process lifecycle: spawn, respawn, locate
//!
//! [`ProcessManager`] owns the spawn path (via an [`AgentSpawner`], so
//! tests never fork real processes) and implements [`AgentLocator`], the
//! narrow capability the message router depends on. The locator resolves
//! mention targets to registry records and revives offline agents before
//! delivery.

use crate::error::{AgentError, Result};
use crate::registry::ProcessRegistry;
use crate::types::{AgentConfig, AgentProcess, AgentStatus, GLOBAL_PROJECT};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Narrow lookup/liveness capability consumed by the router
#[async_trait]
pub trait AgentLocator: Send + Sync {
    /// Resolve a mention target (agent id, config name, or role) to a
    /// record. Ambiguous matches across projects are an error, not a guess.
    async fn find(&self, target: &str, project_id: Option<&str>) -> Result<AgentProcess>;

    /// Bring an agent online, respawning it if necessary
    async fn ensure_alive(&self, agent_id: &str) -> Result<AgentProcess>;

    /// Online (or busy) agents in a project
    async fn list_online(&self, project_id: &str) -> Result<Vec<AgentProcess>>;

    /// Record that an agent is handling a message
    async fn mark_busy(&self, agent_id: &str) -> Result<()>;
}

/// Starts the agent subprocess and reports its pid
#[async_trait]
pub trait AgentSpawner: Send + Sync {
    async fn spawn(&self, agent: &AgentProcess) -> Result<u32>;
}

/// Spawns the real agent binary as a detached child
pub struct CommandSpawner {
    binary: String,
    api_url: String,
}

impl CommandSpawner {
    pub fn new(binary: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            api_url: api_url.into(),
        }
    }
}

#[async_trait]
impl AgentSpawner for CommandSpawner {
    async fn spawn(&self, agent: &AgentProcess) -> Result<u32> {
        let child = tokio::process::Command::new(&self.binary)
            .arg("--api")
            .args(["--agent-id", &agent.agent_id])
            .args(["--project", &agent.project_id])
            .args(["--role", &agent.role])
            .env("CLAUDE_STUDIO_API", &self.api_url)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| AgentError::Spawn(format!("{}: {e}", self.binary)))?;

        // The child outlives this handle; the registry health check and the
        // cleaner own its fate from here.
        child
            .id()
            .ok_or_else(|| AgentError::Spawn(format!("{}: no pid after spawn", self.binary)))
    }
}

/// Spawn, respawn and locate agents through the registry
pub struct ProcessManager {
    registry: Arc<ProcessRegistry>,
    spawner: Arc<dyn AgentSpawner>,
    online_wait: Duration,
    online_poll: Duration,
}

impl ProcessManager {
    pub fn new(registry: Arc<ProcessRegistry>, spawner: Arc<dyn AgentSpawner>) -> Self {
        Self {
            registry,
            spawner,
            online_wait: Duration::from_secs(10),
            online_poll: Duration::from_millis(250),
        }
    }

    /// Shorten the online-wait budget (tests)
    pub fn with_online_wait(mut self, wait: Duration, poll: Duration) -> Self {
        self.online_wait = wait;
        self.online_poll = poll;
        self
    }

    /// Register and start a new agent
    pub async fn spawn_agent(
        &self,
        agent_id: &str,
        project_id: Option<&str>,
        role: &str,
        config: AgentConfig,
    ) -> Result<AgentProcess> {
        let project_id = project_id.unwrap_or(GLOBAL_PROJECT);
        let record = AgentProcess::new(agent_id, project_id, role, config);
        self.registry.register(record.clone()).await?;

        let pid = self.spawner.spawn(&record).await?;
        self.registry.update_pid(agent_id, pid).await?;
        info!(agent_id = %agent_id, pid, "Agent spawned");

        self.registry
            .get(agent_id)
            .await
            .ok_or_else(|| AgentError::NotFound(agent_id.to_string()))
    }

    /// Restart the process behind an existing record
    pub async fn respawn(&self, agent_id: &str) -> Result<AgentProcess> {
        let record = self
            .registry
            .get(agent_id)
            .await
            .ok_or_else(|| AgentError::NotFound(agent_id.to_string()))?;

        debug!(agent_id = %agent_id, "Respawning agent");
        let pid = self.spawner.spawn(&record).await?;
        self.registry.update_pid(agent_id, pid).await?;

        self.registry
            .get(agent_id)
            .await
            .ok_or_else(|| AgentError::NotFound(agent_id.to_string()))
    }

    /// Tear down an agent record (the process itself is the cleaner's job)
    pub async fn remove_agent(&self, agent_id: &str) -> Result<()> {
        self.registry.remove(agent_id).await
    }

    async fn wait_until_online(&self, agent_id: &str) -> Result<AgentProcess> {
        let mut waited = Duration::ZERO;
        loop {
            if let Some(agent) = self.registry.get(agent_id).await {
                if matches!(agent.status, AgentStatus::Online | AgentStatus::Busy) && agent.pid.is_some() {
                    return Ok(agent);
                }
            }
            if waited >= self.online_wait {
                return Err(AgentError::Timeout {
                    operation: format!("waiting for '{agent_id}' to come online"),
                    duration_ms: self.online_wait.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.online_poll).await;
            waited += self.online_poll;
        }
    }
}

#[async_trait]
impl AgentLocator for ProcessManager {
    async fn find(&self, target: &str, project_id: Option<&str>) -> Result<AgentProcess> {
        let all = self.registry.all().await;

        let mut candidates: Vec<&AgentProcess> = all
            .iter()
            .filter(|a| {
                a.agent_id == target
                    || a.config.name.eq_ignore_ascii_case(target)
                    || a.role.eq_ignore_ascii_case(target)
            })
            .collect();

        if let Some(project) = project_id {
            let scoped: Vec<&AgentProcess> = candidates
                .iter()
                .copied()
                .filter(|a| a.project_id == project || a.project_id == GLOBAL_PROJECT)
                .collect();
            if !scoped.is_empty() {
                candidates = scoped;
            }
        }

        if candidates.is_empty() {
            return Err(AgentError::NotFound(target.to_string()));
        }

        // An exact agent-id hit is never ambiguous
        if let Some(exact) = candidates.iter().find(|a| a.agent_id == target) {
            return Ok((*exact).clone());
        }

        let projects: BTreeSet<&str> = candidates.iter().map(|a| a.project_id.as_str()).collect();
        if projects.len() > 1 {
            return Err(AgentError::Ambiguous {
                name: target.to_string(),
                projects: projects.into_iter().map(str::to_string).collect(),
            });
        }

        Ok(candidates[0].clone())
    }

    async fn ensure_alive(&self, agent_id: &str) -> Result<AgentProcess> {
        let agent = self
            .registry
            .get(agent_id)
            .await
            .ok_or_else(|| AgentError::NotFound(agent_id.to_string()))?;

        if matches!(agent.status, AgentStatus::Online | AgentStatus::Busy) && agent.pid.is_some() {
            return Ok(agent);
        }

        self.respawn(agent_id).await?;
        self.wait_until_online(agent_id).await
    }

    async fn list_online(&self, project_id: &str) -> Result<Vec<AgentProcess>> {
        Ok(self
            .registry
            .get_by_project(project_id)
            .await
            .into_iter()
            .filter(|a| matches!(a.status, AgentStatus::Online | AgentStatus::Busy))
            .collect())
    }

    async fn mark_busy(&self, agent_id: &str) -> Result<()> {
        self.registry.update_status(agent_id, AgentStatus::Busy).await
    }
}
