//! WebSocket surface: upgrade handling and per-client reader/writer tasks.

pub mod hub;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::state::AppState;

use self::hub::{ClientHandle, HEARTBEAT_INTERVAL};

/// Inbound control frame: replaces the client's topic filter.
#[derive(Debug, Deserialize)]
struct FilterRequest {
    topics: Vec<String>,
}

/// Handle WebSocket upgrade request. The 11th concurrent client is
/// rejected before the upgrade completes.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.hub.is_full() {
        return (StatusCode::SERVICE_UNAVAILABLE, "too many WebSocket clients").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    // Registration can still race with other upgrades; re-check under the
    // registry lock.
    let client = match state.hub.register() {
        Ok(client) => client,
        Err(_) => {
            debug!("rejecting WebSocket client, hub full");
            return;
        }
    };
    let conn_id = client.id;
    let (sender, receiver) = socket.split();

    let writer = tokio::spawn(write_loop(sender, Arc::clone(&client)));
    let reader = tokio::spawn(read_loop(receiver, Arc::clone(&client)));

    // Either side terminating cancels the other through the shared token.
    let _ = writer.await;
    let _ = reader.await;

    state.hub.remove(conn_id);
    debug!(client = %conn_id, "WebSocket client disconnected");
}

async fn write_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
    client: Arc<ClientHandle>,
) {
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first interval tick fires immediately; skip it so the first ping
    // goes out one heartbeat after connect.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = client.cancel.cancelled() => break,
            _ = heartbeat.tick() => {
                if client.pong_overdue() {
                    warn!(client = %client.id, "no pong within the timeout, evicting");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            frame = client.next_frame() => {
                let Some(frame) = frame else { break };
                if sender.send(Message::Text(frame.as_ref().into())).await.is_err() {
                    break;
                }
            }
        }
    }
    client.cancel.cancel();
    let _ = sender.close().await;
}

async fn read_loop(
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    client: Arc<ClientHandle>,
) {
    loop {
        tokio::select! {
            _ = client.cancel.cancelled() => break,
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => client.touch_pong(),
                    Some(Ok(Message::Text(text))) => {
                        client.touch_pong();
                        match serde_json::from_str::<FilterRequest>(text.as_str()) {
                            Ok(filter) => {
                                client.set_topics(filter.topics.into_iter().collect());
                            }
                            Err(_) => {
                                debug!(client = %client.id, "ignoring unrecognised client frame");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(client = %client.id, error = %err, "WebSocket read error");
                        break;
                    }
                }
            }
        }
    }
    client.cancel.cancel();
}
