//! IPC client for sending mentions to other agents
//!
//! Connections are short-lived: connect to the target's socket, write one
//! frame, optionally wait for the correlated response, close. A missing
//! socket or refused connection surfaces as a transport error; the caller
//! (the router) decides whether to respawn the target.

use crate::error::{AgentError, Result};
use crate::ipc::message::{IpcMessage, IpcMessageType};
use crate::types::socket_path;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

/// Default budget for connect/write/read on one exchange
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client side of the per-agent socket protocol
#[derive(Debug, Clone)]
pub struct IpcClient {
    timeout: Duration,
    /// Directory override for tests; production uses the shared temp dir
    socket_dir: Option<PathBuf>,
}

impl Default for IpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl IpcClient {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            socket_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_socket_dir(mut self, dir: PathBuf) -> Self {
        self.socket_dir = Some(dir);
        self
    }

    fn path_for(&self, agent_id: &str) -> PathBuf {
        match &self.socket_dir {
            Some(dir) => dir.join(format!("claude-agents.{agent_id}")),
            None => socket_path(agent_id),
        }
    }

    /// Fire-and-forget delivery of a mention
    pub async fn send_mention(
        &self,
        from: &str,
        to: &str,
        content: &str,
        project_id: Option<String>,
    ) -> Result<()> {
        let message = IpcMessage::mention(from, to, content).with_project(project_id);
        let mut stream = self.connect(to).await?;
        self.write_frame(&mut stream, &message).await?;
        Ok(())
    }

    /// Deliver a mention and block until the correlated response arrives
    pub async fn send_and_wait(
        &self,
        from: &str,
        to: &str,
        content: &str,
        project_id: Option<String>,
        wait_timeout: Duration,
    ) -> Result<IpcMessage> {
        let message = IpcMessage::mention(from, to, content).with_project(project_id);
        let correlation_id = message.correlation_id.clone();

        let mut stream = self.connect(to).await?;
        self.write_frame(&mut stream, &message).await?;

        let waited = tokio::time::timeout(wait_timeout, async {
            let mut reader = BufReader::new(&mut stream);
            let mut line = String::new();
            loop {
                line.clear();
                let read = reader
                    .read_line(&mut line)
                    .await
                    .map_err(|e| AgentError::Transport(format!("read from '{to}': {e}")))?;
                if read == 0 {
                    return Err(AgentError::Transport(format!("'{to}' closed the connection")));
                }
                match IpcMessage::from_frame(&line) {
                    Ok(reply)
                        if reply.message_type == IpcMessageType::Response
                            && reply.correlation_id == correlation_id =>
                    {
                        return Ok(reply);
                    }
                    Ok(other) => {
                        debug!(to = %to, message_type = ?other.message_type, "Skipping uncorrelated frame");
                    }
                    Err(e) => {
                        return Err(AgentError::Transport(format!("bad frame from '{to}': {e}")));
                    }
                }
            }
        })
        .await;

        match waited {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout {
                operation: format!("response from '{to}'"),
                duration_ms: wait_timeout.as_millis() as u64,
            }),
        }
    }

    /// Send a raw message without waiting (broadcast fan-out)
    pub async fn send_message(&self, to: &str, message: &IpcMessage) -> Result<()> {
        let mut stream = self.connect(to).await?;
        self.write_frame(&mut stream, message).await?;
        Ok(())
    }

    async fn connect(&self, to: &str) -> Result<UnixStream> {
        let path = self.path_for(to);
        tokio::time::timeout(self.timeout, UnixStream::connect(&path))
            .await
            .map_err(|_| AgentError::Timeout {
                operation: format!("connect to '{to}'"),
                duration_ms: self.timeout.as_millis() as u64,
            })?
            .map_err(|e| AgentError::Transport(format!("connect to {}: {e}", path.display())))
    }

    async fn write_frame(&self, stream: &mut UnixStream, message: &IpcMessage) -> Result<()> {
        let frame = message.to_frame()?;
        tokio::time::timeout(self.timeout, async {
            stream.write_all(frame.as_bytes()).await?;
            stream.flush().await?;
            Ok::<_, std::io::Error>(())
        })
        .await
        .map_err(|_| AgentError::Timeout {
            operation: "write frame".to_string(),
            duration_ms: self.timeout.as_millis() as u64,
        })?
        .map_err(|e| AgentError::Transport(format!("write: {e}")))
    }
}
