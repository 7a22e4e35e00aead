//! API route definitions

use super::handlers::{self, SharedState};
use super::{family_handlers, history_handlers, suggestion_handlers, ws_chat_handler, ws_handlers};
use crate::auth::middleware::require_auth;
use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Create the API router
pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allow_origin(&state.allowed_origins))
        .allow_methods(Any)
        .allow_headers(Any);

    // Everything under /api sits behind `require_auth`
    let api = Router::new()
        // ====================================================================
        // Chat history
        // ====================================================================
        .route(
            "/api/app-chat/history",
            get(history_handlers::get_history),
        )
        // ====================================================================
        // AI suggestions
        // ====================================================================
        .route(
            "/api/ai/suggestions",
            get(suggestion_handlers::list_suggestions)
                .post(suggestion_handlers::generate_suggestions),
        )
        .route(
            "/api/ai/suggestions/{id}/accept",
            post(suggestion_handlers::accept_suggestion),
        )
        .route(
            "/api/ai/suggestions/{id}/dismiss",
            post(suggestion_handlers::dismiss_suggestion),
        )
        .route(
            "/api/ai/suggestions/{id}/assign",
            post(suggestion_handlers::assign_suggestion),
        )
        // ====================================================================
        // Family
        // ====================================================================
        .route("/api/children", post(family_handlers::create_child))
        .route("/api/children/{id}", get(family_handlers::get_child))
        .route(
            "/api/children/{id}/learning-goals",
            get(family_handlers::list_learning_goals),
        )
        .route(
            "/api/children/{id}/assignments",
            get(family_handlers::list_assignments),
        )
        .route(
            "/api/parents/{id}/chore-templates",
            get(family_handlers::list_chore_templates),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // WebSockets authenticate through their first frame
        .route("/ws/app-chat", get(ws_chat_handler::ws_app_chat))
        .route("/ws/events", get(ws_handlers::ws_events))
        .merge(api)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn allow_origin(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() {
        return AllowOrigin::from(Any);
    }
    let values: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(values)
}
