//! Inter-agent IPC over local stream sockets
//!
//! Newline-delimited JSON frames on one Unix domain socket per agent.
//! [`IpcServer`] is the agent-side endpoint, [`IpcClient`] the short-lived
//! sender, [`IpcMessage`] the frame schema.

pub mod client;
pub mod message;
pub mod server;

pub use client::IpcClient;
pub use message::{IpcMessage, IpcMessageType, UNKNOWN_AGENT};
pub use server::{IpcServer, MessageHandler};
