//! OS process probing and signalling
//!
//! [`ProcessProbe`] answers "does this pid exist" via a signal-0 probe;
//! [`ProcessSignals`] extends it with graceful and forced termination.
//! Both sit behind traits so the registry health check and the zombie
//! cleaner can be tested against fake process tables.

use crate::error::Result;

/// Liveness probe for an OS process
pub trait ProcessProbe: Send + Sync {
    /// Signal-0 probe: true when the pid exists (even if owned by another
    /// user), false when the process is gone
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe plus termination signals
pub trait ProcessSignals: ProcessProbe {
    /// Graceful termination (SIGTERM); "no such process" counts as success
    fn terminate(&self, pid: u32) -> Result<()>;

    /// Forced kill (SIGKILL); "no such process" counts as success
    fn force_kill(&self, pid: u32) -> Result<()>;
}

/// Real signals via the `nix` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct NixSignals;

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use crate::error::AgentError;
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    fn send(pid: u32, signal: Option<Signal>) -> std::result::Result<(), Errno> {
        kill(Pid::from_raw(pid as i32), signal)
    }

    impl ProcessProbe for NixSignals {
        fn is_alive(&self, pid: u32) -> bool {
            match send(pid, None) {
                Ok(()) => true,
                // Alive but owned by someone else
                Err(Errno::EPERM) => true,
                Err(_) => false,
            }
        }
    }

    impl ProcessSignals for NixSignals {
        fn terminate(&self, pid: u32) -> Result<()> {
            match send(pid, Some(Signal::SIGTERM)) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(AgentError::Custom(format!("SIGTERM to {pid} failed: {e}"))),
            }
        }

        fn force_kill(&self, pid: u32) -> Result<()> {
            match send(pid, Some(Signal::SIGKILL)) {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => Err(AgentError::Custom(format!("SIGKILL to {pid} failed: {e}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        let probe = NixSignals;
        assert!(probe.is_alive(std::process::id()));
    }

    #[test]
    fn test_nonexistent_pid_is_dead() {
        let probe = NixSignals;
        // Max pid space on Linux tops out well below this
        assert!(!probe.is_alive(4_000_000));
    }
}
