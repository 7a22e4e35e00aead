//! WebSocket authentication via the first `auth` frame.
//!
//! Used by sockets that do not go through the chat registry (`/ws/events`).
//! The chat socket runs the same check through `ConnectionSession`.
//!
//! Until an `auth` frame is accepted, other frames are dropped without a
//! reply. A rejected `auth` frame gets an `error` frame and the socket stays
//! open for another attempt.

use crate::auth::PartyVerifier;
use crate::chat::{check_auth_frame, AuthAttempt, Party, ServerFrame};
use axum::extract::ws::{Message, WebSocket};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Wait for an accepted `auth` frame.
///
/// Returns `Err(reason)` when the socket closes (or the server shuts down)
/// before the handshake completes.
pub async fn ws_authenticate(
    socket: &mut WebSocket,
    verifier: &PartyVerifier,
    shutdown: &CancellationToken,
) -> Result<Party, String> {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => return Err("Server shutting down".to_string()),
            msg = socket.recv() => msg,
        };

        let text = match msg {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                return Err("Socket closed before authentication".to_string())
            }
            Some(Err(e)) => return Err(format!("Socket error: {}", e)),
            Some(Ok(_)) => continue,
        };

        match check_auth_frame(text.as_str(), verifier) {
            AuthAttempt::Accepted(party) => return Ok(party),
            AuthAttempt::Rejected(reason) => {
                debug!(%reason, "WS auth frame rejected");
                send_frame(socket, &ServerFrame::error(reason)).await?;
            }
            AuthAttempt::NotAuth => {
                debug!("Dropping frame before authentication");
            }
        }
    }
}

/// Serialize and send one server frame
pub async fn send_frame(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), String> {
    socket
        .send(Message::Text(frame.to_json().into()))
        .await
        .map_err(|e| format!("Socket send failed: {}", e))
}
