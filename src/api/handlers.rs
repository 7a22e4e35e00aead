//! Shared server state, health check and the API error type

use crate::ai::{ReplyGenerator, SuggestionGenerator};
use crate::auth::PartyVerifier;
use crate::chat::{ChatHistory, ChatRouter, ConnectionRegistry};
use crate::events::EventBus;
use crate::store::FamilyStore;
use crate::suggestions::{SuggestionEngine, SuggestionError};
use crate::Config;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared server state
pub struct ServerState {
    pub store: Arc<dyn FamilyStore>,
    pub engine: Arc<SuggestionEngine>,
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<ChatRouter>,
    pub event_bus: Arc<EventBus>,
    /// Identity check for WebSocket handshakes and REST callers
    pub verifier: PartyVerifier,
    /// Origins allowed by CORS; empty means any origin
    pub allowed_origins: Vec<String>,
    /// Default `limit` for the history endpoint
    pub history_limit: usize,
    /// Cancelled on shutdown so long-lived sockets close
    pub shutdown: CancellationToken,
}

pub type SharedState = Arc<ServerState>;

impl ServerState {
    /// Wire the chat and suggestion services on top of a store and AI provider
    pub fn from_config(
        config: &Config,
        store: Arc<dyn FamilyStore>,
        replies: Arc<dyn ReplyGenerator>,
        generator: Arc<dyn SuggestionGenerator>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(ChatRouter::new(
            registry.clone(),
            ChatHistory::new(store.clone()),
            replies,
            config.chat_context_limit,
        ));
        let engine = Arc::new(SuggestionEngine::new(
            store.clone(),
            generator,
            event_bus.clone(),
        ));

        Self {
            store,
            engine,
            registry,
            router,
            event_bus,
            verifier: PartyVerifier::from_secret(config.jwt_secret()),
            allowed_origins: config.allowed_origins.clone(),
            history_limit: config.chat_history_limit,
            shutdown: CancellationToken::new(),
        }
    }
}

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    pub live_connections: usize,
}

/// Health check handler.
///
/// Returns 200 + `"ok"` when the store answers, 503 + `"unhealthy"` otherwise.
pub async fn health(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let store_ok = state.store.health_check().await.is_ok();

    let (http_status, status) = if store_ok {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        http_status,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: if store_ok {
                "connected".to_string()
            } else {
                "disconnected".to_string()
            },
            live_connections: state.registry.connection_count(),
        }),
    )
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<SuggestionError> for AppError {
    fn from(err: SuggestionError) -> Self {
        match err {
            SuggestionError::NotFound(_) => AppError::NotFound(err.to_string()),
            SuggestionError::AlreadyResolved { .. } => AppError::Conflict(err.to_string()),
            SuggestionError::InvalidRequest(_) | SuggestionError::Materialization(_) => {
                AppError::BadRequest(err.to_string())
            }
            SuggestionError::Generator(_) => AppError::BadGateway(err.to_string()),
            SuggestionError::Store(e) => AppError::Internal(e),
        }
    }
}
