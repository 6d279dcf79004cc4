//! WebSocket endpoint for real-time event streaming
//!
//! Clients connect, receive every [`WsEvent`](super::events::WsEvent) as a
//! JSON text frame, and may disconnect at any time. Slow clients that fall
//! behind the broadcast buffer are skipped ahead rather than blocking the
//! producers.

use crate::api::routes::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// Upgrade handler for `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.broadcast.subscribe();
    ws.on_upgrade(move |socket| client_loop(socket, rx))
}

async fn client_loop(
    mut socket: WebSocket,
    mut events: tokio::sync::broadcast::Receiver<crate::api::ws::events::WsEvent>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if socket.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "WebSocket client lagged, skipping events");
                }
                Err(RecvError::Closed) => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(Message::Ping(payload))) => {
                    if socket.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(_)) => {} // inbound frames are ignored
                Some(Err(_)) => break,
            },
        }
    }
    debug!("WebSocket client disconnected");
}
