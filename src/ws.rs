//! Websocket boundary: one task per connection, bridging the socket and the
//! room's outbound channel.
//!
//! The connection task owns the socket. It forwards `Outbound::Message`
//! frames from the room and feeds parsed inbound messages into the room
//! under its lock. When the room drops this connection's sender (organizer
//! displaced), the task stops forwarding but keeps the socket open and keeps
//! reading, so the client is not cut off mid-frame. An explicit
//! `Outbound::Close` (kick, room teardown) closes the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::IntoResponse,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::app::AppState;
use crate::config::{MAX_WS_MESSAGE_SIZE, WS_RATE_LIMIT_PER_SEC};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::room::Outbound;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub organizer: bool,
    #[serde(default)]
    pub spectator: bool,
    pub token: Option<String>,
}

/// Upgrade handler for `/ws/{room_code}/{client_id}`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path((room_code, client_id)): Path<(String, String)>,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!(
        "WebSocket connection request: room={}, client={}, organizer={}, spectator={}",
        room_code,
        client_id,
        params.organizer,
        params.spectator
    );

    ws.on_upgrade(move |socket| handle_socket(socket, room_code, client_id, params, state))
}

async fn handle_socket(
    mut socket: WebSocket,
    room_code: String,
    client_id: String,
    params: WsQuery,
    state: Arc<AppState>,
) {
    let Some(room) = state.registry.get(&room_code).await else {
        let _ = send_error(&mut socket, &format!("Room '{}' not found", room_code)).await;
        let _ = socket.close().await;
        return;
    };

    let is_organizer = params.organizer;
    if is_organizer && !room.verify_token(params.token.as_deref().unwrap_or("")) {
        let _ = send_error(&mut socket, "Invalid organizer token").await;
        let _ = socket.close().await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    if is_organizer {
        room.attach_organizer(&client_id, tx).await;
    } else if params.spectator {
        room.attach_spectator(&client_id, tx).await;
    } else {
        room.attach_player(&client_id, tx).await;
    }

    let (mut sender, mut receiver) = socket.split();

    // Removed from the room's live set but the socket stays open
    let mut detached = false;
    // Per-second inbound cap
    let mut window_start = Instant::now();
    let mut window_count: u32 = 0;

    loop {
        tokio::select! {
            outbound = rx.recv(), if !detached => {
                match outbound {
                    Some(Outbound::Message(msg)) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Outbound::Close) => {
                        break;
                    }
                    None => {
                        detached = true;
                    }
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_WS_MESSAGE_SIZE {
                            let _ = send_frame(&mut sender, &ServerMessage::Error {
                                message: "Message too large".to_string(),
                            }).await;
                            continue;
                        }

                        if window_start.elapsed() >= Duration::from_secs(1) {
                            window_start = Instant::now();
                            window_count = 0;
                        }
                        window_count += 1;
                        if window_count > WS_RATE_LIMIT_PER_SEC {
                            let _ = send_frame(&mut sender, &ServerMessage::Error {
                                message: "Too many messages".to_string(),
                            }).await;
                            continue;
                        }

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                if params.spectator {
                                    // Observers never mutate room state
                                    continue;
                                }
                                room.handle_message(&client_id, msg, is_organizer).await;
                            }
                            Err(e) => {
                                tracing::debug!("Malformed message from {}: {}", client_id, e);
                                let _ = send_frame(&mut sender, &ServerMessage::Error {
                                    message: "Invalid message format".to_string(),
                                }).await;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error for {}: {}", client_id, e);
                        break;
                    }
                }
            }
        }
    }

    room.remove_connection(&client_id).await;
    tracing::debug!("Connection {} to room {} closed", client_id, room.room_code);
}

async fn send_error(socket: &mut WebSocket, message: &str) -> Result<(), axum::Error> {
    let msg = ServerMessage::Error {
        message: message.to_string(),
    };
    match serde_json::to_string(&msg) {
        Ok(json) => socket.send(Message::Text(json.into())).await,
        Err(_) => Ok(()),
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(_) => Ok(()),
    }
}
