//! WebSocket surface: event definitions and the client handler

pub mod events;
pub mod handler;

pub use events::{spawn_forwarders, BroadcastState, WsEvent};
pub use handler::ws_handler;
