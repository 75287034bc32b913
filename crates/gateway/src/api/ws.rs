//! WebSocket endpoint for task processing.
//!
//! Flow:
//! 1. Client connects to `/api/v1/task/process`.
//! 2. A writer task drains a bounded channel into the socket; the bus
//!    sink feeds that channel without ever blocking a worker.
//! 3. Inbound frames are JSON `{event, data}`; `user_input` spawns a
//!    task worker. Unknown events and invalid JSON are logged and
//!    skipped.
//! 4. Socket close (or a dead sink) removes the connection from the bus.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::bus::ChannelSink;
use crate::state::AppState;
use crate::worker;

/// Outbound frames buffered per connection before the sink is
/// considered dead.
const OUTBOUND_BUFFER: usize = 256;

/// GET /api/v1/task/process — upgrade to WebSocket.
pub async fn task_process(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer task: drains the sink channel into the socket.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    state
        .bus
        .connect(&conn_id, Arc::new(ChannelSink::new(out_tx)));
    tracing::info!(conn_id, "websocket client connected");

    // Reader loop: connection message handling is sequential.
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(conn_id, error = %e, "websocket receive error");
                break;
            }
        };
        match msg {
            Message::Text(text) => {
                let parsed: serde_json::Value = match serde_json::from_str(&text) {
                    Ok(v) => v,
                    Err(_) => {
                        tracing::warn!(conn_id, "invalid JSON frame ignored");
                        continue;
                    }
                };
                let event = parsed.get("event").and_then(|v| v.as_str()).unwrap_or("");
                let data = parsed
                    .get("data")
                    .cloned()
                    .unwrap_or(serde_json::Value::Null);

                match event {
                    "user_input" => {
                        worker::handle_user_input(state.clone(), &conn_id, &data).await;
                    }
                    other => {
                        tracing::warn!(conn_id, event = other, "unknown event type");
                    }
                }
            }
            Message::Close(_) => break,
            // Ping/pong handled by axum; binary frames ignored.
            _ => {}
        }
    }

    state.bus.disconnect(&conn_id);
    writer.abort();
    tracing::info!(conn_id, "websocket connection cleaned up");
}
