//! Auth middleware for Axum routes.
//!
//! Validates JWT Bearer tokens and injects Claims into request extensions.
//! In open mode (no `auth.jwt_secret`) requests pass through without claims.

use crate::api::handlers::{AppError, SharedState};
use crate::auth::jwt::decode_jwt;
use crate::auth::PartyVerifier;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Middleware that requires a valid JWT Bearer token when auth is configured.
///
/// # Behavior
/// 1. Open mode → pass through, no claims inserted
/// 2. Extract `Authorization: Bearer <token>` header → 401 if missing
/// 3. Validate JWT with the configured secret → 401 if invalid/expired
/// 4. Inject `Claims` into request extensions for downstream handlers
pub async fn require_auth(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let secret = match &state.verifier {
        PartyVerifier::Open => return Ok(next.run(req).await),
        PartyVerifier::Jwt { secret } => secret,
    };

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let claims = decode_jwt(token, secret)
        .map_err(|e| AppError::Unauthorized(format!("Invalid token: {:#}", e)))?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

// ============================================================================
// Tests
// ============================================================================
