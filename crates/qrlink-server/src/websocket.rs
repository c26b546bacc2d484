//! WebSocket handler for pairing notifications
//!
//! A viewer holds one socket per pairing session and receives the login
//! result the moment a scanner redeems the session. The session id itself is
//! the capability: sockets for unknown sessions are closed with a policy
//! violation code.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path as AxumPath, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use qrlink_core::NotifyMessage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::state::AppState;

/// How often the server probes an idle pairing socket
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket handler for `/pair/{session_id}`
pub async fn pair_ws_handler(
    ws: WebSocketUpgrade,
    AxumPath(session_id): AxumPath<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_pair_socket(socket, state, session_id))
}

/// Handle one pairing notification connection
pub async fn handle_pair_socket(mut socket: WebSocket, state: Arc<AppState>, session_id: String) {
    // The session id is the capability; unknown ids get a policy close
    if state.sessions.get(&session_id).await.is_err() {
        warn!("Rejected pairing socket for unknown session {}", session_id);
        let frame = CloseFrame {
            code: close_code::POLICY,
            reason: "unknown pairing session".into(),
        };
        let _ = socket.send(Message::Close(Some(frame))).await;
        return;
    }

    let (epoch, mut rx) = state.channels.open(&session_id).await;
    let (mut sender, mut receiver) = socket.split();

    info!("Viewer attached to pairing session {}", session_id);

    let mut keepalive = tokio::time::interval_at(
        tokio::time::Instant::now() + KEEPALIVE_INTERVAL,
        KEEPALIVE_INTERVAL,
    );

    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(message) => {
                    let Ok(json) = serde_json::to_string(&message) else { continue };
                    if sender.send(Message::Text(json)).await.is_err() {
                        state.channels.release(&session_id, epoch).await;
                        break;
                    }
                }
                // Queue gone: displaced by a newer viewer, or released by the
                // orchestrator after delivering the login result
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    // Echo client frames back as the client-driven keepalive
                    if sender.send(Message::Text(format!("Echo: {text}"))).await.is_err() {
                        state.channels.release(&session_id, epoch).await;
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        state.channels.release(&session_id, epoch).await;
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    state.channels.release(&session_id, epoch).await;
                    break;
                }
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    state.channels.release(&session_id, epoch).await;
                    break;
                }
                _ => {}
            },
            _ = keepalive.tick() => {
                // Probe failure counts as a disconnect
                let probe = NotifyMessage::Ping {
                    timestamp: std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap()
                        .as_millis() as u64,
                };
                let Ok(json) = serde_json::to_string(&probe) else { continue };
                if sender.send(Message::Text(json)).await.is_err() {
                    state.channels.release(&session_id, epoch).await;
                    break;
                }
            }
        }
    }

    info!("Viewer detached from pairing session {}", session_id);
}
