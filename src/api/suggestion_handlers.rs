//! AI suggestion endpoints

use super::handlers::{AppError, SharedState};
use super::query::SuggestionListQuery;
use crate::auth::extractor::Caller;
use crate::suggestions::models::{Acceptance, GenerateParams, Suggestion, SuggestionKind};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSuggestionsRequest {
    pub child_id: String,
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub params: GenerateParams,
}

impl GenerateSuggestionsRequest {
    /// Parse requested kinds; an unknown name is a client error
    pub fn parsed_kinds(&self) -> Result<Vec<SuggestionKind>, AppError> {
        self.kinds
            .iter()
            .map(|k| k.parse::<SuggestionKind>().map_err(AppError::BadRequest))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignSuggestionRequest {
    pub child_id: String,
}

/// GET /api/ai/suggestions?childId&status&kind
pub async fn list_suggestions(
    State(state): State<SharedState>,
    caller: Caller,
    Query(query): Query<SuggestionListQuery>,
) -> Result<Json<Vec<Suggestion>>, AppError> {
    let child_id = query.child_id()?;
    caller
        .ensure_child_access(state.store.as_ref(), child_id)
        .await?;
    let suggestions = state
        .engine
        .list(child_id, query.status, query.kind)
        .await?;
    Ok(Json(suggestions))
}

/// POST /api/ai/suggestions: generate a batch for a child
pub async fn generate_suggestions(
    State(state): State<SharedState>,
    caller: Caller,
    Json(req): Json<GenerateSuggestionsRequest>,
) -> Result<(StatusCode, Json<Vec<Suggestion>>), AppError> {
    let kinds = req.parsed_kinds()?;
    caller
        .ensure_child_access(state.store.as_ref(), &req.child_id)
        .await?;
    let created = state
        .engine
        .generate(&req.child_id, &kinds, &req.params)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Load a suggestion and check the caller may act on its child
async fn authorized_suggestion(
    state: &SharedState,
    caller: &Caller,
    id: Uuid,
) -> Result<Suggestion, AppError> {
    let suggestion = state.engine.get(id).await?;
    caller
        .ensure_child_access(state.store.as_ref(), &suggestion.child_id)
        .await?;
    Ok(suggestion)
}

/// POST /api/ai/suggestions/{id}/accept
pub async fn accept_suggestion(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Acceptance>, AppError> {
    authorized_suggestion(&state, &caller, id).await?;
    Ok(Json(state.engine.accept(id).await?))
}

/// POST /api/ai/suggestions/{id}/dismiss
pub async fn dismiss_suggestion(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Suggestion>, AppError> {
    authorized_suggestion(&state, &caller, id).await?;
    Ok(Json(state.engine.dismiss(id).await?))
}

/// POST /api/ai/suggestions/{id}/assign: accept on behalf of a sibling
pub async fn assign_suggestion(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignSuggestionRequest>,
) -> Result<Json<Acceptance>, AppError> {
    authorized_suggestion(&state, &caller, id).await?;
    caller
        .ensure_child_access(state.store.as_ref(), &req.child_id)
        .await?;
    Ok(Json(state.engine.assign(id, &req.child_id).await?))
}
