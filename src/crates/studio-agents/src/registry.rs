//! Process registry: the single source of truth for agent processes
//!
//! [`ProcessRegistry`] owns every [`AgentProcess`] record. All other
//! components read through it and mutate through its API; each mutation is
//! mirrored to `<tmp>/claude-agents/registry.json` with a full-file
//! rewrite serialised behind a write lock, so the on-disk snapshot is
//! never partial.
//!
//! A background health monitor probes every registered pid on a fixed
//! cadence (30 seconds in production). A failed probe transitions the
//! record to `offline` and emits `process:status-change`; probe failures
//! are independent, so one dead agent never stops the sweep.

use crate::error::{AgentError, Result};
use crate::events::{ProcessEvent, ProcessEvents};
use crate::probe::ProcessProbe;
use crate::types::{AgentProcess, AgentStatus, RegistryFile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default cadence of the background health sweep
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Result of probing one agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub alive: bool,
}

/// Authoritative map of agents to process state
pub struct ProcessRegistry {
    processes: RwLock<HashMap<String, AgentProcess>>,
    path: PathBuf,
    write_lock: Mutex<()>,
    events: ProcessEvents,
    probe: Arc<dyn ProcessProbe>,
    shutdown: watch::Sender<bool>,
}

impl ProcessRegistry {
    /// Open a registry backed by `path`, loading any existing file
    ///
    /// A corrupt file is reported once and treated as empty; a missing
    /// file is a fresh start.
    pub fn open(path: PathBuf, probe: Arc<dyn ProcessProbe>) -> Self {
        let processes = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<RegistryFile>(&raw) {
                Ok(file) => file.processes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt registry file, starting fresh");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        let (shutdown, _) = watch::channel(false);
        Self {
            processes: RwLock::new(processes),
            path,
            write_lock: Mutex::new(()),
            events: ProcessEvents::default(),
            probe,
            shutdown,
        }
    }

    /// Event stream for `process:*` events
    pub fn events(&self) -> &ProcessEvents {
        &self.events
    }

    /// Add or replace a record
    pub async fn register(&self, agent: AgentProcess) -> Result<()> {
        let agent_id = agent.agent_id.clone();
        {
            let mut processes = self.processes.write().await;
            processes.insert(agent_id.clone(), agent);
        }
        self.persist().await?;
        self.events.emit(ProcessEvent::Registered { agent_id });
        Ok(())
    }

    /// Transition an agent's status, bumping its activity timestamp
    pub async fn update_status(&self, agent_id: &str, status: AgentStatus) -> Result<()> {
        {
            let mut processes = self.processes.write().await;
            let agent = processes
                .get_mut(agent_id)
                .ok_or_else(|| AgentError::NotFound(agent_id.to_string()))?;
            agent.status = status;
            agent.touch();
        }
        self.persist().await?;
        self.events.emit(ProcessEvent::StatusChange {
            agent_id: agent_id.to_string(),
            status,
        });
        Ok(())
    }

    /// Record the pid of a spawned agent and bring it online
    pub async fn update_pid(&self, agent_id: &str, pid: u32) -> Result<()> {
        {
            let mut processes = self.processes.write().await;
            let agent = processes
                .get_mut(agent_id)
                .ok_or_else(|| AgentError::NotFound(agent_id.to_string()))?;
            agent.pid = Some(pid);
            agent.status = AgentStatus::Online;
            agent.touch();
        }
        self.persist().await?;
        self.events.emit(ProcessEvent::StatusChange {
            agent_id: agent_id.to_string(),
            status: AgentStatus::Online,
        });
        Ok(())
    }

    /// Track the latest LLM session handle for an agent
    pub async fn update_session(&self, agent_id: &str, session_id: &str) -> Result<()> {
        {
            let mut processes = self.processes.write().await;
            let agent = processes
                .get_mut(agent_id)
                .ok_or_else(|| AgentError::NotFound(agent_id.to_string()))?;
            agent.session_id = Some(session_id.to_string());
            agent.touch();
        }
        self.persist().await
    }

    pub async fn get(&self, agent_id: &str) -> Option<AgentProcess> {
        self.processes.read().await.get(agent_id).cloned()
    }

    pub async fn get_by_project(&self, project_id: &str) -> Vec<AgentProcess> {
        self.processes
            .read()
            .await
            .values()
            .filter(|a| a.project_id == project_id)
            .cloned()
            .collect()
    }

    pub async fn get_online(&self) -> Vec<AgentProcess> {
        self.processes
            .read()
            .await
            .values()
            .filter(|a| matches!(a.status, AgentStatus::Online | AgentStatus::Busy))
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<AgentProcess> {
        self.processes.read().await.values().cloned().collect()
    }

    /// Registered pids (agents that have completed their spawn)
    pub async fn registered_pids(&self) -> Vec<u32> {
        self.processes.read().await.values().filter_map(|a| a.pid).collect()
    }

    pub async fn count(&self) -> usize {
        self.processes.read().await.len()
    }

    /// Remove one agent
    pub async fn remove(&self, agent_id: &str) -> Result<()> {
        let removed = self.processes.write().await.remove(agent_id).is_some();
        if !removed {
            return Err(AgentError::NotFound(agent_id.to_string()));
        }
        self.persist().await?;
        self.events.emit(ProcessEvent::Removed {
            agent_id: agent_id.to_string(),
        });
        Ok(())
    }

    /// Remove every agent owned by a project, returning how many went away
    pub async fn remove_project(&self, project_id: &str) -> Result<usize> {
        let removed: Vec<String> = {
            let mut processes = self.processes.write().await;
            let ids: Vec<String> = processes
                .values()
                .filter(|a| a.project_id == project_id)
                .map(|a| a.agent_id.clone())
                .collect();
            for id in &ids {
                processes.remove(id);
            }
            ids
        };

        if !removed.is_empty() {
            self.persist().await?;
            for agent_id in &removed {
                self.events.emit(ProcessEvent::Removed { agent_id: agent_id.clone() });
            }
        }
        Ok(removed.len())
    }

    /// Clear the whole registry (emergency cleanup)
    pub async fn clear(&self) -> Result<usize> {
        let removed: Vec<String> = {
            let mut processes = self.processes.write().await;
            let ids: Vec<String> = processes.keys().cloned().collect();
            processes.clear();
            ids
        };
        self.persist().await?;
        for agent_id in &removed {
            self.events.emit(ProcessEvent::Removed { agent_id: agent_id.clone() });
        }
        Ok(removed.len())
    }

    /// Probe every registered agent once
    ///
    /// Dead processes (and pid-less records claiming to be up) transition
    /// to `offline` with a status-change event. Each probe is independent.
    pub async fn perform_health_check(&self) -> Result<Vec<HealthCheck>> {
        let snapshot: Vec<(String, Option<u32>, AgentStatus)> = self
            .processes
            .read()
            .await
            .values()
            .map(|a| (a.agent_id.clone(), a.pid, a.status))
            .collect();

        let mut checks = Vec::with_capacity(snapshot.len());
        for (agent_id, pid, status) in snapshot {
            let alive = pid.map(|p| self.probe.is_alive(p)).unwrap_or(false);
            checks.push(HealthCheck {
                agent_id: agent_id.clone(),
                pid,
                alive,
            });

            if !alive && status != AgentStatus::Offline {
                debug!(agent_id = %agent_id, ?pid, "Health probe failed, marking offline");
                if let Err(e) = self.update_status(&agent_id, AgentStatus::Offline).await {
                    warn!(agent_id = %agent_id, error = %e, "Failed to mark agent offline");
                }
            }
        }
        Ok(checks)
    }

    /// Remove every record whose probe currently fails, returning the count
    pub async fn prune_dead(&self) -> Result<usize> {
        let checks = self.perform_health_check().await?;
        let mut pruned = 0;
        for check in checks.iter().filter(|c| !c.alive) {
            if self.remove(&check.agent_id).await.is_ok() {
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Start the periodic health sweep
    ///
    /// Runs until [`shutdown`](Self::shutdown) is called. The first sweep
    /// happens one interval after start.
    pub fn start_health_monitor(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // first tick completes immediately
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = registry.perform_health_check().await {
                            warn!(error = %e, "Health sweep failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Stop the health monitor and flush a final snapshot
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.persist().await
    }

    /// Serialised best-effort full write of the registry file
    ///
    /// The snapshot is taken under the write guard so concurrent mutations
    /// cannot land an older snapshot after a newer one.
    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let snapshot = self.processes.read().await.clone();
        let file = RegistryFile::new(snapshot);
        let encoded = serde_json::to_string_pretty(&file)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::Registry(format!("create {}: {e}", parent.display())))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &encoded)
            .await
            .map_err(|e| AgentError::Registry(format!("write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AgentError::Registry(format!("rename {}: {e}", self.path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AgentConfig;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Probe backed by an explicit set of live pids
    pub struct FakeProbe {
        alive: StdMutex<HashSet<u32>>,
    }

    impl FakeProbe {
        pub fn with_alive(pids: &[u32]) -> Arc<Self> {
            Arc::new(Self {
                alive: StdMutex::new(pids.iter().copied().collect()),
            })
        }

        pub fn mark_dead(&self, pid: u32) {
            self.alive.lock().unwrap().remove(&pid);
        }
    }

    impl ProcessProbe for FakeProbe {
        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }
    }

    fn agent(id: &str, pid: Option<u32>, status: AgentStatus) -> AgentProcess {
        let mut agent = AgentProcess::new(id, "proj-1", "developer", AgentConfig::for_role("developer"));
        agent.pid = pid;
        agent.status = status;
        agent
    }

    fn registry_in(dir: &TempDir, probe: Arc<dyn ProcessProbe>) -> ProcessRegistry {
        ProcessRegistry::open(dir.path().join("registry.json"), probe)
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir, FakeProbe::with_alive(&[100]));

        registry.register(agent("a", Some(100), AgentStatus::Online)).await.unwrap();

        assert!(registry.get("a").await.is_some());
        assert_eq!(registry.get_by_project("proj-1").await.len(), 1);
        assert_eq!(registry.get_online().await.len(), 1);
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_file_mirrors_in_memory_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        let registry = ProcessRegistry::open(path.clone(), FakeProbe::with_alive(&[1, 2]));

        registry.register(agent("a", Some(1), AgentStatus::Online)).await.unwrap();
        registry.register(agent("b", Some(2), AgentStatus::Busy)).await.unwrap();
        registry.remove("a").await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let file: RegistryFile = serde_json::from_str(&raw).unwrap();
        assert_eq!(file.processes.len(), 1);
        assert!(file.processes.contains_key("b"));
        assert_eq!(file.version, "1.0.0");

        // A new registry instance loads the same state
        let reloaded = ProcessRegistry::open(path, FakeProbe::with_alive(&[2]));
        assert!(reloaded.get("b").await.is_some());
        assert!(reloaded.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "{broken").unwrap();

        let registry = ProcessRegistry::open(path, FakeProbe::with_alive(&[]));
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_health_check_marks_dead_agents_offline() {
        let dir = TempDir::new().unwrap();
        let probe = FakeProbe::with_alive(&[100, 200]);
        let registry = registry_in(&dir, probe.clone());
        let mut events = registry.events().subscribe();

        registry.register(agent("alive", Some(100), AgentStatus::Online)).await.unwrap();
        registry.register(agent("dying", Some(200), AgentStatus::Online)).await.unwrap();
        probe.mark_dead(200);

        let checks = registry.perform_health_check().await.unwrap();
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().find(|c| c.agent_id == "alive").unwrap().alive);
        assert!(!checks.iter().find(|c| c.agent_id == "dying").unwrap().alive);

        assert_eq!(registry.get("dying").await.unwrap().status, AgentStatus::Offline);
        assert_eq!(registry.get("alive").await.unwrap().status, AgentStatus::Online);

        // Registered + registered + status-change events were emitted
        let mut saw_offline = false;
        while let Ok(event) = events.try_recv() {
            if matches!(&event, ProcessEvent::StatusChange { agent_id, status }
                if agent_id == "dying" && *status == AgentStatus::Offline)
            {
                saw_offline = true;
            }
        }
        assert!(saw_offline);
    }

    #[tokio::test]
    async fn test_pidless_record_is_marked_offline() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir, FakeProbe::with_alive(&[]));

        registry.register(agent("ghost", None, AgentStatus::Online)).await.unwrap();
        registry.perform_health_check().await.unwrap();

        assert_eq!(registry.get("ghost").await.unwrap().status, AgentStatus::Offline);
    }

    #[tokio::test]
    async fn test_remove_project() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir, FakeProbe::with_alive(&[1, 2]));

        registry.register(agent("a", Some(1), AgentStatus::Online)).await.unwrap();
        let mut other = agent("b", Some(2), AgentStatus::Online);
        other.project_id = "proj-2".to_string();
        registry.register(other).await.unwrap();

        let removed = registry.remove_project("proj-1").await.unwrap();
        assert_eq!(removed, 1);
        assert!(registry.get("a").await.is_none());
        assert!(registry.get("b").await.is_some());
    }

    #[tokio::test]
    async fn test_prune_dead_removes_entries() {
        let dir = TempDir::new().unwrap();
        let probe = FakeProbe::with_alive(&[100]);
        let registry = registry_in(&dir, probe.clone());

        registry.register(agent("alive", Some(100), AgentStatus::Online)).await.unwrap();
        registry.register(agent("dead", Some(999), AgentStatus::Online)).await.unwrap();

        let pruned = registry.prune_dead().await.unwrap();
        assert_eq!(pruned, 1);
        assert!(registry.get("dead").await.is_none());
        assert!(registry.get("alive").await.is_some());
    }

    #[tokio::test]
    async fn test_health_monitor_sweeps_on_interval() {
        let dir = TempDir::new().unwrap();
        let probe = FakeProbe::with_alive(&[100]);
        let registry = Arc::new(registry_in(&dir, probe.clone()));

        registry.register(agent("a", Some(100), AgentStatus::Online)).await.unwrap();
        let handle = registry.start_health_monitor(Duration::from_millis(20));

        probe.mark_dead(100);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(registry.get("a").await.unwrap().status, AgentStatus::Offline);

        registry.shutdown().await.unwrap();
        let _ = handle.await;
    }
}
