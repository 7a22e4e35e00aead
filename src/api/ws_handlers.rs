//! WebSocket handler for real-time CRUD event notifications (`/ws/events`)
//!
//! Same first-frame handshake as the chat socket; afterwards the party
//! receives every `CrudEvent` that concerns it.

use super::handlers::SharedState;
use crate::chat::Party;
use crate::events::{CrudEvent, EntityType};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use tokio::time::{interval, Duration};
use tracing::{debug, warn};

/// Query parameters for filtering WebSocket events
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    /// Comma-separated entity types to subscribe to (e.g. "suggestion,chore_template")
    pub entity_types: Option<String>,
}

/// WebSocket upgrade handler for `/ws/events`
pub async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let entity_filter = query.entity_types.as_deref().map(parse_entity_filter);
    ws.on_upgrade(move |socket| handle_ws(socket, state, entity_filter))
}

fn parse_entity_filter(types: &str) -> HashSet<EntityType> {
    types
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| match serde_json::from_value(serde_json::Value::String(s.to_string())) {
            Ok(entity_type) => Some(entity_type),
            Err(_) => {
                debug!(entity_type = s, "Ignoring unknown entity type filter");
                None
            }
        })
        .collect()
}

/// Check the event concerns the party and passes the entity filter
fn passes_filters(
    event: &CrudEvent,
    party: &Party,
    entity_filter: &Option<HashSet<EntityType>>,
) -> bool {
    if !event.is_visible_to(party) {
        return false;
    }
    match entity_filter {
        Some(filter) => filter.contains(&event.entity_type),
        None => true,
    }
}

/// Handle an individual WebSocket connection
async fn handle_ws(
    mut socket: WebSocket,
    state: SharedState,
    entity_filter: Option<HashSet<EntityType>>,
) {
    // Subscribe before the handshake so nothing emitted meanwhile is lost
    let mut event_rx = state.event_bus.subscribe();

    let party = match super::ws_auth::ws_authenticate(&mut socket, &state.verifier, &state.shutdown)
        .await
    {
        Ok(party) => party,
        Err(reason) => {
            debug!(reason = %reason, "WS events: auth failed");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Ping interval (30s)
    let mut ping_interval = interval(Duration::from_secs(30));
    // Skip the first immediate tick
    ping_interval.tick().await;

    debug!(%party, entity_filter = ?entity_filter, "WebSocket events client authenticated");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,

            result = event_rx.recv() => {
                match result {
                    Ok(event) => {
                        if !passes_filters(&event, &party, &entity_filter) {
                            continue;
                        }
                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                                    debug!("WebSocket send failed, client disconnected");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("Failed to serialize CrudEvent: {}", e);
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, %party, "WebSocket client lagged, skipping events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Event bus closed, shutting down WebSocket");
                        break;
                    }
                }
            }

            // Send periodic pings to detect dead clients
            _ = ping_interval.tick() => {
                if ws_sender.send(Message::Ping(vec![].into())).await.is_err() {
                    debug!("Ping failed, client disconnected");
                    break;
                }
            }

            // Handle incoming messages from the client (Pong, Close)
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        // Client is alive
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {
                        // Ignore text/binary messages after the handshake
                    }
                }
            }
        }
    }

    let _ = ws_sender.close().await;
    debug!(%party, "WebSocket events connection closed");
}
