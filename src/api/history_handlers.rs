//! Chat history endpoint

use super::handlers::{AppError, SharedState};
use super::query::HistoryQuery;
use crate::auth::extractor::Caller;
use crate::chat::ChatMessage;
use axum::{
    extract::{Query, State},
    Json,
};

/// GET /api/app-chat/history: a party's messages, newest first
pub async fn get_history(
    State(state): State<SharedState>,
    caller: Caller,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let party = query.party()?;
    caller
        .ensure_history_access(state.store.as_ref(), &party)
        .await?;

    let limit = query.limit.unwrap_or(state.history_limit);
    let messages = state.router.history().recent_stored(&party, limit).await?;
    Ok(Json(messages))
}
