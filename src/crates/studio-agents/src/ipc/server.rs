//! Per-agent IPC server
//!
//! Each agent binds one Unix domain socket at
//! `<tmp>/claude-agents.<agentId>`, removing any stale file first. The
//! server accepts any number of concurrent client connections; each
//! connection gets its own reader task and writer task, so a slow peer
//! never blocks the accept loop or the message handler.
//!
//! Inbound frames are dispatched to the owning agent's [`MessageHandler`].
//! A handler response is written to every currently connected peer.
//! Malformed frames are answered with an `error` frame on the offending
//! connection and counted, but the connection stays open.

use crate::error::{AgentError, Result};
use crate::ipc::message::IpcMessage;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handles messages addressed to the owning agent
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one inbound message, optionally producing a reply
    async fn handle(&self, message: IpcMessage) -> Option<IpcMessage>;
}

type PeerMap = Arc<StdMutex<HashMap<u64, mpsc::UnboundedSender<String>>>>;
type TaskList = Arc<StdMutex<Vec<JoinHandle<()>>>>;

/// Stream-socket endpoint for one agent
pub struct IpcServer {
    agent_id: String,
    socket_path: PathBuf,
    handler: Arc<dyn MessageHandler>,
    peers: PeerMap,
    malformed_frames: Arc<AtomicU64>,
    accept_task: StdMutex<Option<JoinHandle<()>>>,
    connection_tasks: TaskList,
}

impl IpcServer {
    pub fn new(agent_id: impl Into<String>, socket_path: PathBuf, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            agent_id: agent_id.into(),
            socket_path,
            handler,
            peers: Arc::new(StdMutex::new(HashMap::new())),
            malformed_frames: Arc::new(AtomicU64::new(0)),
            accept_task: StdMutex::new(None),
            connection_tasks: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Frames that failed to parse since start
    pub fn malformed_frame_count(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    /// Currently connected peers
    pub fn connection_count(&self) -> usize {
        self.peers.lock().expect("peer map lock poisoned").len()
    }

    /// Bind the socket and start accepting connections
    pub async fn start(&self) -> Result<()> {
        if self.socket_path.exists() {
            debug!(path = %self.socket_path.display(), "Removing stale socket");
            std::fs::remove_file(&self.socket_path)?;
        }

        let listener = UnixListener::bind(&self.socket_path)
            .map_err(|e| AgentError::Transport(format!("bind {}: {e}", self.socket_path.display())))?;
        debug!(agent_id = %self.agent_id, path = %self.socket_path.display(), "IPC server listening");

        let agent_id = self.agent_id.clone();
        let handler = Arc::clone(&self.handler);
        let peers = Arc::clone(&self.peers);
        let malformed = Arc::clone(&self.malformed_frames);
        let connection_tasks = Arc::clone(&self.connection_tasks);

        let task = tokio::spawn(async move {
            let mut next_peer_id = 0u64;
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => {
                        next_peer_id += 1;
                        let handles = spawn_connection(
                            next_peer_id,
                            stream,
                            agent_id.clone(),
                            Arc::clone(&handler),
                            Arc::clone(&peers),
                            Arc::clone(&malformed),
                        );
                        connection_tasks
                            .lock()
                            .expect("connection task lock poisoned")
                            .extend(handles);
                    }
                    Err(e) => {
                        warn!(agent_id = %agent_id, error = %e, "Accept failed, server stopping");
                        break;
                    }
                }
            }
        });

        *self.accept_task.lock().expect("accept task lock poisoned") = Some(task);
        Ok(())
    }

    /// Write a message to every connected peer
    pub fn broadcast(&self, message: &IpcMessage) -> Result<()> {
        let frame = message.to_frame()?;
        let peers = self.peers.lock().expect("peer map lock poisoned");
        for sender in peers.values() {
            let _ = sender.send(frame.clone());
        }
        Ok(())
    }

    /// Destroy connections, close the listener, delete the socket file
    pub async fn stop(&self) {
        if let Some(task) = self.accept_task.lock().expect("accept task lock poisoned").take() {
            task.abort();
        }
        for task in self.connection_tasks.lock().expect("connection task lock poisoned").drain(..) {
            task.abort();
        }
        self.peers.lock().expect("peer map lock poisoned").clear();
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(path = %self.socket_path.display(), error = %e, "Failed to remove socket file");
            }
        }
        debug!(agent_id = %self.agent_id, "IPC server stopped");
    }
}

/// Per-connection reader and writer tasks
fn spawn_connection(
    peer_id: u64,
    stream: UnixStream,
    agent_id: String,
    handler: Arc<dyn MessageHandler>,
    peers: PeerMap,
    malformed: Arc<AtomicU64>,
) -> [JoinHandle<()>; 2] {
    let (read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    peers.lock().expect("peer map lock poisoned").insert(peer_id, tx.clone());

    // Writer: frames are delivered in send order on this connection
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if write_half.write_all(frame.as_bytes()).await.is_err() {
                break;
            }
            let _ = write_half.flush().await;
        }
    });

    // Reader: parse newline-delimited frames and dispatch
    let reader = tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(agent_id = %agent_id, peer_id, error = %e, "Read failed, dropping connection");
                    break;
                }
            }
            if line.trim().is_empty() {
                continue;
            }

            let message = match IpcMessage::from_frame(&line) {
                Ok(message) => message,
                Err(e) => {
                    malformed.fetch_add(1, Ordering::Relaxed);
                    warn!(agent_id = %agent_id, peer_id, error = %e, "Malformed IPC frame");
                    let error = IpcMessage::error(&agent_id, "unknown", format!("malformed frame: {e}"));
                    if let Ok(frame) = error.to_frame() {
                        let _ = tx.send(frame);
                    }
                    continue;
                }
            };

            debug!(agent_id = %agent_id, peer_id, from = %message.from, "IPC message received");
            if let Some(reply) = handler.handle(message).await {
                if let Ok(frame) = reply.to_frame() {
                    let senders: Vec<_> = peers
                        .lock()
                        .expect("peer map lock poisoned")
                        .values()
                        .cloned()
                        .collect();
                    for sender in senders {
                        let _ = sender.send(frame.clone());
                    }
                }
            }
        }
        peers.lock().expect("peer map lock poisoned").remove(&peer_id);
    });

    [reader, writer]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::message::IpcMessageType;
    use tempfile::TempDir;

    /// Echoes every mention back as a correlated response
    struct EchoHandler {
        agent_id: String,
    }

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn handle(&self, message: IpcMessage) -> Option<IpcMessage> {
            (message.message_type == IpcMessageType::Mention).then(|| {
                IpcMessage::response(
                    &self.agent_id,
                    &message.from,
                    format!("echo: {}", message.content_text()),
                    message.correlation_id.clone(),
                )
            })
        }
    }

    async fn connect_and_send(path: &std::path::Path, message: &IpcMessage) -> UnixStream {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream.write_all(message.to_frame().unwrap().as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
        stream
    }

    async fn read_frame(stream: &mut UnixStream) -> IpcMessage {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        IpcMessage::from_frame(&line).unwrap()
    }

    fn server_in(dir: &TempDir, agent_id: &str) -> IpcServer {
        IpcServer::new(
            agent_id,
            dir.path().join(format!("claude-agents.{agent_id}")),
            Arc::new(EchoHandler { agent_id: agent_id.to_string() }),
        )
    }

    #[tokio::test]
    async fn test_mention_gets_correlated_response() {
        let dir = TempDir::new().unwrap();
        let server = server_in(&dir, "agent-1");
        server.start().await.unwrap();

        let mention = IpcMessage::mention("caller", "agent-1", "hello");
        let mut stream = connect_and_send(&dir.path().join("claude-agents.agent-1"), &mention).await;

        let reply = read_frame(&mut stream).await;
        assert_eq!(reply.message_type, IpcMessageType::Response);
        assert_eq!(reply.correlation_id, mention.correlation_id);
        assert_eq!(reply.content_text(), "echo: hello");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stale_socket_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("claude-agents.agent-1");
        std::fs::write(&path, "stale").unwrap();

        let server = server_in(&dir, "agent-1");
        server.start().await.unwrap();

        // Bind succeeded over the stale file
        let _stream = UnixStream::connect(&path).await.unwrap();
        server.stop().await;
        assert!(!path.exists(), "stop removes the socket file");
    }

    #[tokio::test]
    async fn test_malformed_frame_answers_error_and_keeps_connection() {
        let dir = TempDir::new().unwrap();
        let server = server_in(&dir, "agent-1");
        server.start().await.unwrap();

        let path = dir.path().join("claude-agents.agent-1");
        let mut stream = UnixStream::connect(&path).await.unwrap();
        stream.write_all(b"this is not json\n").await.unwrap();
        stream.flush().await.unwrap();

        let reply = read_frame(&mut stream).await;
        assert_eq!(reply.message_type, IpcMessageType::Error);
        assert_eq!(server.malformed_frame_count(), 1);

        // The same connection still works for valid frames
        let mention = IpcMessage::mention("caller", "agent-1", "still here");
        stream.write_all(mention.to_frame().unwrap().as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
        let reply = read_frame(&mut stream).await;
        assert_eq!(reply.content_text(), "echo: still here");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_responses_reach_all_connected_peers() {
        let dir = TempDir::new().unwrap();
        let server = server_in(&dir, "agent-1");
        server.start().await.unwrap();
        let path = dir.path().join("claude-agents.agent-1");

        // Passive observer connects first
        let mut observer = UnixStream::connect(&path).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mention = IpcMessage::mention("caller", "agent-1", "fan out");
        let mut sender = connect_and_send(&path, &mention).await;

        let to_sender = read_frame(&mut sender).await;
        let to_observer = read_frame(&mut observer).await;
        assert_eq!(to_sender.content_text(), "echo: fan out");
        assert_eq!(to_observer.content_text(), "echo: fan out");

        server.stop().await;
    }
}
