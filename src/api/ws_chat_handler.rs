//! WebSocket handler for `/ws/app-chat`
//!
//! One reader loop and one writer task per socket:
//! - the writer owns the sink, drains the connection's outbound channel
//!   (fed by the registry) and pings every 30s
//! - the reader runs the handshake state machine and hands `chat` frames to
//!   the router one at a time, so replies on one connection keep the order
//!   of the messages that caused them

use super::handlers::SharedState;
use crate::chat::{ConnectionSession, FrameAction, ServerFrame};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{debug, info};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket upgrade handler for `/ws/app-chat`
pub async fn ws_app_chat(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state))
}

async fn handle_chat_socket(socket: WebSocket, state: SharedState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();
    let handle = state.registry.register(tx);
    let mut session =
        ConnectionSession::new(handle, state.registry.clone(), state.verifier.clone());

    let writer = tokio::spawn(async move {
        let mut ping_interval = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else {
                        // Unregistered: nothing more will be queued
                        break;
                    };
                    if ws_sender.send(Message::Text(frame.to_json().into())).await.is_err() {
                        debug!(%handle, "WebSocket send failed, client disconnected");
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_sender.send(Message::Ping(vec![].into())).await.is_err() {
                        debug!(%handle, "Ping failed, client disconnected");
                        break;
                    }
                }
            }
        }
        let _ = ws_sender.close().await;
    });

    debug!(%handle, "Chat socket opened");

    loop {
        let msg = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            msg = ws_receiver.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => match session.on_text(text.as_str()) {
                FrameAction::Ignore | FrameAction::Authenticated(_) => {}
                FrameAction::Reply(frame) => {
                    state.registry.send_to(handle, frame);
                }
                FrameAction::Chat { party, message } => {
                    state.router.handle_chat(handle, &party, &message).await;
                }
            },
            Some(Ok(Message::Pong(_))) => {
                // Client is alive
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!(%handle, "WebSocket client disconnected");
                break;
            }
            Some(Err(e)) => {
                debug!(%handle, "WebSocket error: {}", e);
                break;
            }
            Some(Ok(_)) => {
                // Binary frames are not part of the protocol
            }
        }
    }

    // Dropping the registry's sender lets the writer flush and close
    state.registry.unregister(handle);
    let _ = writer.await;

    match session.party() {
        Some(party) => info!(%handle, %party, "Chat socket closed"),
        None => debug!(%handle, "Unauthenticated chat socket closed"),
    }
}
