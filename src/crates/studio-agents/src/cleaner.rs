//! Zombie agent discovery and cleanup
//!
//! Agents are external OS processes, so crashes and lost registry entries
//! leave orphans behind. [`ProcessCleaner`] enumerates running processes
//! whose command lines match the agent binary pattern, kills the ones the
//! registry does not know about (TERM, a 2-second grace period, then
//! KILL), and asks the registry to prune entries whose probe now fails.
//!
//! Discovery parses standard `ps` output: whitespace-separated columns,
//! numeric pid in column 2, command from column 10 onwards. Both discovery
//! and signalling sit behind traits so the sweep is testable against fake
//! process tables.

use crate::error::{AgentError, Result};
use crate::probe::ProcessSignals;
use crate::registry::ProcessRegistry;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Command-line pattern matching the agent binary
pub fn default_agent_pattern() -> Regex {
    Regex::new(r"@anthropic-ai/claude-code|claude-code\s+(--api|api)").expect("agent pattern")
}

/// One process found by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProcess {
    pub pid: u32,
    pub command: String,
}

/// Enumerates running agent processes on the host
#[async_trait]
pub trait ProcessEnumerator: Send + Sync {
    async fn discover(&self, pattern: &Regex) -> Result<Vec<DiscoveredProcess>>;
}

/// Discovery via `ps aux`
#[derive(Debug, Clone, Copy, Default)]
pub struct PsEnumerator;

#[async_trait]
impl ProcessEnumerator for PsEnumerator {
    async fn discover(&self, pattern: &Regex) -> Result<Vec<DiscoveredProcess>> {
        let output = tokio::process::Command::new("ps")
            .arg("aux")
            .output()
            .await
            .map_err(|e| AgentError::Custom(format!("failed to run ps: {e}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_ps_output(&stdout, pattern))
    }
}

/// Parse `ps` output into discovered agent processes
fn parse_ps_output(output: &str, pattern: &Regex) -> Vec<DiscoveredProcess> {
    output
        .lines()
        .skip(1) // header
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() < 11 {
                return None;
            }
            let pid: u32 = columns[1].parse().ok()?;
            let command = columns[10..].join(" ");
            pattern.is_match(&command).then_some(DiscoveredProcess { pid, command })
        })
        .collect()
}

/// Outcome of one cleanup sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    /// One entry per killed process, formatted `PID <pid>: <cmd>`
    pub killed_processes: Vec<String>,
    /// Registry entries removed because their probe failed
    pub cleaned_registry_entries: usize,
    /// Non-fatal failures collected along the way
    pub errors: Vec<String>,
}

/// Discovers rogue agent processes and reclaims them
pub struct ProcessCleaner {
    registry: Arc<ProcessRegistry>,
    enumerator: Arc<dyn ProcessEnumerator>,
    signals: Arc<dyn ProcessSignals>,
    pattern: Regex,
    grace_period: Duration,
}

impl ProcessCleaner {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        enumerator: Arc<dyn ProcessEnumerator>,
        signals: Arc<dyn ProcessSignals>,
        pattern: Regex,
    ) -> Self {
        Self {
            registry,
            enumerator,
            signals,
            pattern,
            grace_period: Duration::from_secs(2),
        }
    }

    /// Shorten the TERM-to-KILL grace period (tests)
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Kill every discovered agent process the registry does not know about,
    /// then prune registry entries whose probe fails
    pub async fn cleanup_zombies(&self) -> Result<CleanupResult> {
        let mut result = CleanupResult::default();

        let discovered = match self.enumerator.discover(&self.pattern).await {
            Ok(discovered) => discovered,
            Err(e) => {
                result.errors.push(format!("process discovery failed: {e}"));
                return Ok(result);
            }
        };
        let registered: HashSet<u32> = self.registry.registered_pids().await.into_iter().collect();

        for process in discovered {
            if registered.contains(&process.pid) {
                continue;
            }
            info!(pid = process.pid, command = %process.command, "Killing zombie agent process");
            match self.kill_gracefully(process.pid).await {
                Ok(()) => result
                    .killed_processes
                    .push(format!("PID {}: {}", process.pid, process.command)),
                Err(e) => result.errors.push(format!("PID {}: {e}", process.pid)),
            }
        }

        match self.registry.prune_dead().await {
            Ok(pruned) => result.cleaned_registry_entries = pruned,
            Err(e) => result.errors.push(format!("registry prune failed: {e}")),
        }

        Ok(result)
    }

    /// Force-kill every discovered agent process and clear the registry
    pub async fn emergency_cleanup(&self) -> Result<CleanupResult> {
        let mut result = CleanupResult::default();

        let discovered = match self.enumerator.discover(&self.pattern).await {
            Ok(discovered) => discovered,
            Err(e) => {
                result.errors.push(format!("process discovery failed: {e}"));
                Vec::new()
            }
        };

        for process in discovered {
            warn!(pid = process.pid, "Emergency kill");
            match self.signals.force_kill(process.pid) {
                Ok(()) => result
                    .killed_processes
                    .push(format!("PID {}: {}", process.pid, process.command)),
                Err(e) => result.errors.push(format!("PID {}: {e}", process.pid)),
            }
        }

        match self.registry.clear().await {
            Ok(cleared) => result.cleaned_registry_entries = cleared,
            Err(e) => result.errors.push(format!("registry clear failed: {e}")),
        }

        Ok(result)
    }

    /// Number of agent processes currently running on the host
    pub async fn get_process_count(&self) -> Result<usize> {
        Ok(self.enumerator.discover(&self.pattern).await?.len())
    }

    /// True when more agent processes run than the registry knows about
    pub async fn needs_cleanup(&self) -> Result<bool> {
        let discovered = self.enumerator.discover(&self.pattern).await?.len();
        let registered = self.registry.registered_pids().await.len();
        Ok(discovered > registered)
    }

    /// TERM, wait up to the grace period, then KILL if still alive
    async fn kill_gracefully(&self, pid: u32) -> Result<()> {
        self.signals.terminate(pid)?;

        let poll = Duration::from_millis(100);
        let mut waited = Duration::ZERO;
        while waited < self.grace_period {
            if !self.signals.is_alive(pid) {
                return Ok(());
            }
            tokio::time::sleep(poll).await;
            waited += poll;
        }

        if self.signals.is_alive(pid) {
            self.signals.force_kill(pid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProcessProbe;
    use crate::registry::ProcessRegistry;
    use crate::types::{AgentConfig, AgentProcess, AgentStatus};
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Fake process table shared between enumerator and signals
    #[derive(Default)]
    struct FakeHost {
        processes: StdMutex<Vec<DiscoveredProcess>>,
        terminated: StdMutex<Vec<u32>>,
        killed: StdMutex<Vec<u32>>,
    }

    impl FakeHost {
        fn with_processes(processes: Vec<(u32, &str)>) -> Arc<Self> {
            Arc::new(Self {
                processes: StdMutex::new(
                    processes
                        .into_iter()
                        .map(|(pid, command)| DiscoveredProcess { pid, command: command.to_string() })
                        .collect(),
                ),
                ..Default::default()
            })
        }

        fn terminated(&self) -> Vec<u32> {
            self.terminated.lock().unwrap().clone()
        }

        fn killed(&self) -> Vec<u32> {
            self.killed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessEnumerator for FakeHost {
        async fn discover(&self, pattern: &Regex) -> Result<Vec<DiscoveredProcess>> {
            Ok(self
                .processes
                .lock()
                .unwrap()
                .iter()
                .filter(|p| pattern.is_match(&p.command))
                .cloned()
                .collect())
        }
    }

    impl ProcessProbe for FakeHost {
        fn is_alive(&self, pid: u32) -> bool {
            let terminated = self.terminated.lock().unwrap();
            let killed = self.killed.lock().unwrap();
            let exists = self.processes.lock().unwrap().iter().any(|p| p.pid == pid);
            exists && !terminated.contains(&pid) && !killed.contains(&pid)
        }
    }

    impl ProcessSignals for FakeHost {
        fn terminate(&self, pid: u32) -> Result<()> {
            self.terminated.lock().unwrap().push(pid);
            Ok(())
        }

        fn force_kill(&self, pid: u32) -> Result<()> {
            self.killed.lock().unwrap().push(pid);
            Ok(())
        }
    }

    async fn registry_with_agent(dir: &TempDir, host: Arc<FakeHost>, pid: u32) -> Arc<ProcessRegistry> {
        let registry = Arc::new(ProcessRegistry::open(dir.path().join("registry.json"), host));
        let mut agent = AgentProcess::new("agent-1", "proj", "developer", AgentConfig::for_role("developer"));
        agent.pid = Some(pid);
        agent.status = AgentStatus::Online;
        registry.register(agent).await.unwrap();
        registry
    }

    fn cleaner(registry: Arc<ProcessRegistry>, host: Arc<FakeHost>) -> ProcessCleaner {
        ProcessCleaner::new(registry, host.clone(), host, default_agent_pattern())
            .with_grace_period(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_cleanup_kills_only_unregistered_agents() {
        // P1 registered agent, P2 orphan agent, P3 unrelated process
        let host = FakeHost::with_processes(vec![
            (101, "node @anthropic-ai/claude-code --project a"),
            (102, "node @anthropic-ai/claude-code --project b"),
            (103, "vim notes.txt"),
        ]);
        let dir = TempDir::new().unwrap();
        let registry = registry_with_agent(&dir, host.clone(), 101).await;

        let result = cleaner(registry.clone(), host.clone()).cleanup_zombies().await.unwrap();

        assert_eq!(
            result.killed_processes,
            vec!["PID 102: node @anthropic-ai/claude-code --project b".to_string()]
        );
        assert!(result.errors.is_empty());
        assert_eq!(host.terminated(), vec![102]);
        assert!(host.killed().is_empty(), "graceful TERM was enough");

        // Registered agent stays online and registered
        let agent = registry.get("agent-1").await.unwrap();
        assert_eq!(agent.status, AgentStatus::Online);
    }

    #[tokio::test]
    async fn test_cleanup_escalates_to_sigkill() {
        struct StubbornHost(Arc<FakeHost>);

        #[async_trait]
        impl ProcessEnumerator for StubbornHost {
            async fn discover(&self, pattern: &Regex) -> Result<Vec<DiscoveredProcess>> {
                self.0.discover(pattern).await
            }
        }
        impl ProcessProbe for StubbornHost {
            fn is_alive(&self, pid: u32) -> bool {
                // Ignores SIGTERM entirely
                !self.0.killed.lock().unwrap().contains(&pid)
                    && self.0.processes.lock().unwrap().iter().any(|p| p.pid == pid)
            }
        }
        impl ProcessSignals for StubbornHost {
            fn terminate(&self, pid: u32) -> Result<()> {
                self.0.terminate(pid)
            }
            fn force_kill(&self, pid: u32) -> Result<()> {
                self.0.force_kill(pid)
            }
        }

        let host = FakeHost::with_processes(vec![(201, "claude-code --api")]);
        let stubborn = Arc::new(StubbornHost(host.clone()));
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(ProcessRegistry::open(dir.path().join("registry.json"), stubborn.clone()));

        let cleaner = ProcessCleaner::new(registry, stubborn.clone(), stubborn, default_agent_pattern())
            .with_grace_period(Duration::from_millis(50));
        let result = cleaner.cleanup_zombies().await.unwrap();

        assert_eq!(result.killed_processes.len(), 1);
        assert_eq!(host.terminated(), vec![201]);
        assert_eq!(host.killed(), vec![201]);
    }

    #[tokio::test]
    async fn test_cleanup_prunes_dead_registry_entries() {
        // Registered pid 555 is not in the process table at all
        let host = FakeHost::with_processes(vec![]);
        let dir = TempDir::new().unwrap();
        let registry = registry_with_agent(&dir, host.clone(), 555).await;

        let result = cleaner(registry.clone(), host).cleanup_zombies().await.unwrap();

        assert_eq!(result.cleaned_registry_entries, 1);
        assert!(registry.get("agent-1").await.is_none());
    }

    #[tokio::test]
    async fn test_emergency_cleanup_kills_everything() {
        let host = FakeHost::with_processes(vec![
            (301, "node @anthropic-ai/claude-code one"),
            (302, "claude-code api two"),
        ]);
        let dir = TempDir::new().unwrap();
        let registry = registry_with_agent(&dir, host.clone(), 301).await;

        let result = cleaner(registry.clone(), host.clone()).emergency_cleanup().await.unwrap();

        assert_eq!(result.killed_processes.len(), 2);
        assert_eq!(result.cleaned_registry_entries, 1);
        assert_eq!(host.killed(), vec![301, 302]);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_needs_cleanup() {
        let host = FakeHost::with_processes(vec![
            (401, "node @anthropic-ai/claude-code one"),
            (402, "node @anthropic-ai/claude-code two"),
        ]);
        let dir = TempDir::new().unwrap();
        let registry = registry_with_agent(&dir, host.clone(), 401).await;
        let cleaner = cleaner(registry, host);

        assert!(cleaner.needs_cleanup().await.unwrap());
        assert_eq!(cleaner.get_process_count().await.unwrap(), 2);
    }

    #[test]
    fn test_parse_ps_output_columns() {
        let output = "\
USER   PID %CPU %MEM    VSZ   RSS TTY  STAT START   TIME COMMAND
alice  123  0.0  0.1  10000  2000 ?    S    10:00   0:01 node @anthropic-ai/claude-code --project demo
alice  456  0.0  0.1  10000  2000 ?    S    10:00   0:01 claude-code --api
alice  789  0.0  0.1  10000  2000 ?    S    10:00   0:01 /usr/bin/vim notes.txt
alice  bad  0.0  0.1  10000  2000 ?    S    10:00   0:01 claude-code --api
";
        let processes = parse_ps_output(output, &default_agent_pattern());

        assert_eq!(processes.len(), 2);
        assert_eq!(processes[0].pid, 123);
        assert!(processes[0].command.starts_with("node @anthropic-ai/claude-code"));
        assert_eq!(processes[1].pid, 456);
    }

    #[test]
    fn test_default_pattern_matches_both_forms() {
        let pattern = default_agent_pattern();
        assert!(pattern.is_match("node /opt/@anthropic-ai/claude-code/cli.js"));
        assert!(pattern.is_match("claude-code --api"));
        assert!(pattern.is_match("claude-code api"));
        assert!(!pattern.is_match("claude-code --version"));
        assert!(!pattern.is_match("some-other-daemon"));
    }
}
