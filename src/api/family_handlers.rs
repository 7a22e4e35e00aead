//! Child profiles and the entities materialized from accepted suggestions

use super::handlers::{AppError, SharedState};
use crate::auth::extractor::Caller;
use crate::events::{EntityType, EventEmitter};
use crate::store::models::{ChildProfile, ChoreAssignment, ChoreTemplate, LearningGoal};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChildRequest {
    /// Client-chosen id; generated when absent
    pub id: Option<String>,
    pub parent_id: String,
    pub name: String,
    pub age: Option<u32>,
}

/// POST /api/children: create or update a child profile
pub async fn create_child(
    State(state): State<SharedState>,
    caller: Caller,
    Json(req): Json<CreateChildRequest>,
) -> Result<(StatusCode, Json<ChildProfile>), AppError> {
    let parent_id = req.parent_id.trim();
    let name = req.name.trim();
    if parent_id.is_empty() {
        return Err(AppError::BadRequest("parentId is required".to_string()));
    }
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    caller.ensure_parent(parent_id)?;

    let id = match req.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    };

    let existing = state.store.get_child(&id).await?;
    if let Some(existing) = &existing {
        if existing.parent_id != parent_id {
            return Err(AppError::Conflict(format!(
                "Child {} belongs to another parent",
                id
            )));
        }
    }

    let child = ChildProfile {
        id,
        parent_id: parent_id.to_string(),
        name: name.to_string(),
        age: req.age,
        created_at: existing.map(|c| c.created_at).unwrap_or_else(Utc::now),
    };
    state.store.upsert_child(&child).await?;

    state.event_bus.emit_created(
        EntityType::Child,
        &child.id,
        serde_json::to_value(&child).unwrap_or_default(),
        Some(child.id.clone()),
        Some(child.parent_id.clone()),
    );
    tracing::info!(child_id = %child.id, parent_id = %child.parent_id, "Child profile saved");
    Ok((StatusCode::CREATED, Json(child)))
}

/// Load a child the caller may access, 404 when absent
async fn require_child(
    state: &SharedState,
    caller: &Caller,
    child_id: &str,
) -> Result<ChildProfile, AppError> {
    caller
        .ensure_child_access(state.store.as_ref(), child_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Child {} not found", child_id)))
}

/// GET /api/children/{id}
pub async fn get_child(
    State(state): State<SharedState>,
    caller: Caller,
    Path(child_id): Path<String>,
) -> Result<Json<ChildProfile>, AppError> {
    Ok(Json(require_child(&state, &caller, &child_id).await?))
}

/// GET /api/children/{id}/learning-goals
pub async fn list_learning_goals(
    State(state): State<SharedState>,
    caller: Caller,
    Path(child_id): Path<String>,
) -> Result<Json<Vec<LearningGoal>>, AppError> {
    require_child(&state, &caller, &child_id).await?;
    Ok(Json(state.store.list_learning_goals(&child_id).await?))
}

/// GET /api/children/{id}/assignments
pub async fn list_assignments(
    State(state): State<SharedState>,
    caller: Caller,
    Path(child_id): Path<String>,
) -> Result<Json<Vec<ChoreAssignment>>, AppError> {
    require_child(&state, &caller, &child_id).await?;
    Ok(Json(state.store.list_assignments(&child_id).await?))
}

/// GET /api/parents/{id}/chore-templates
pub async fn list_chore_templates(
    State(state): State<SharedState>,
    caller: Caller,
    Path(parent_id): Path<String>,
) -> Result<Json<Vec<ChoreTemplate>>, AppError> {
    caller.ensure_parent(&parent_id)?;
    Ok(Json(state.store.list_chore_templates(&parent_id).await?))
}

#[cfg(test)]
mod tests {
    use crate::auth::jwt::encode_jwt;
    use crate::chat::Party;
    use crate::store::FamilyStore;
    use crate::suggestions::models::{GenerateParams, SuggestionKind};
    use crate::test_helpers::{mock_server, seeded_mock_server, MockServer, TEST_SECRET};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn call(
        server: &MockServer,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let req = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let resp = crate::api::create_router(server.state.clone())
            .oneshot(req)
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_create_and_get_child() {
        let server = mock_server(None);
        let mut events = server.state.event_bus.subscribe();

        let (status, json) = call(
            &server,
            "POST",
            "/api/children",
            Some(json!({"id": "c1", "parentId": "p1", "name": "Mia", "age": 8})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["parentId"], "p1");
        assert_eq!(events.try_recv().unwrap().entity_id, "c1");

        let (status, json) = call(&server, "GET", "/api/children/c1", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "Mia");
        assert_eq!(json["age"], 8);

        let (status, _) = call(&server, "GET", "/api/children/ghost", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_child_validation() {
        let server = seeded_mock_server(None).await;

        let (status, _) = call(
            &server,
            "POST",
            "/api/children",
            Some(json!({"parentId": "p1", "name": "  "})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // c1 already belongs to p1
        let (status, _) = call(
            &server,
            "POST",
            "/api/children",
            Some(json!({"id": "c1", "parentId": "p2", "name": "Stolen"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, json) = call(
            &server,
            "POST",
            "/api/children",
            Some(json!({"parentId": "p1", "name": "Noa"})),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(!json["id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_materialized_entities_are_listed() {
        let server = seeded_mock_server(None).await;
        server.ai.set_candidates(
            SuggestionKind::Task,
            vec![json!({"title": "Water plants", "points": 5})],
        );
        server.ai.set_candidates(
            SuggestionKind::LearningGoal,
            vec![json!({"subject": "Fractions", "suggestedTargetUnits": 10})],
        );
        let created = server
            .state
            .engine
            .generate(
                "c1",
                &[SuggestionKind::Task, SuggestionKind::LearningGoal],
                &GenerateParams::default(),
            )
            .await
            .unwrap();
        for suggestion in &created {
            match suggestion.kind {
                SuggestionKind::Task => {
                    server.state.engine.assign(suggestion.id, "c2").await.unwrap();
                }
                _ => {
                    server.state.engine.accept(suggestion.id).await.unwrap();
                }
            }
        }

        let (_, templates) = call(&server, "GET", "/api/parents/p1/chore-templates", None, None).await;
        assert_eq!(templates[0]["name"], "Water plants");

        let (_, goals) = call(&server, "GET", "/api/children/c1/learning-goals", None, None).await;
        assert_eq!(goals[0]["subject"], "Fractions");
        assert_eq!(goals[0]["targetUnits"], 10);

        let (_, assignments) = call(&server, "GET", "/api/children/c2/assignments", None, None).await;
        assert_eq!(assignments.as_array().unwrap().len(), 1);
        assert_eq!(assignments[0]["templateId"], templates[0]["id"]);
    }

    #[tokio::test]
    async fn test_ownership_enforced_with_jwt() {
        let server = seeded_mock_server(Some(TEST_SECRET)).await;
        let p1 = encode_jwt(&Party::parent("p1"), "Pat", TEST_SECRET, 60).unwrap();
        let c1 = encode_jwt(&Party::child("c1"), "Mia", TEST_SECRET, 60).unwrap();

        let (status, _) = call(&server, "GET", "/api/children/x9", None, Some(&p1)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&server, "GET", "/api/children/c2", None, Some(&p1)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&server, "GET", "/api/children/c2", None, Some(&c1)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = call(&server, "GET", "/api/parents/p1/chore-templates", None, Some(&c1)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &server,
            "POST",
            "/api/children",
            Some(json!({"parentId": "p2", "name": "Sneaky"})),
            Some(&p1),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(server.store.get_child("c1").await.unwrap().is_some());
    }
}
