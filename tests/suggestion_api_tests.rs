//! Suggestion lifecycle through the public HTTP API
//!
//! Run with: cargo test --test suggestion_api_tests

mod common;

use chore_quest::ai::MockAiProvider;
use chore_quest::auth::jwt::encode_jwt;
use chore_quest::chat::Party;
use chore_quest::store::MemoryStore;
use chore_quest::suggestions::models::SuggestionKind;
use common::*;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;

async fn post(client: &Client, url: String, body: Value) -> (StatusCode, Value) {
    let resp = client.post(url).json(&body).send().await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn get(client: &Client, url: String) -> (StatusCode, Value) {
    let resp = client.get(url).send().await.unwrap();
    let status = resp.status();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn seeded_server() -> TestServer {
    let store = Arc::new(MemoryStore::new());
    seed_family(&store).await;
    let ai = Arc::new(
        MockAiProvider::new()
            .with_candidates(
                SuggestionKind::Task,
                vec![
                    json!({"title": "Tidy the bookshelf", "points": "15", "emoji": "📚"}),
                    json!({"name": "Broken, no points"}),
                    json!({"name": "Water the plants", "pointValue": 5}),
                ],
            )
            .with_candidates(
                SuggestionKind::LearningGoal,
                vec![json!({"title": "Fractions", "suggestedTargetUnits": 4.0, "rationale": "Struggles with halves"})],
            ),
    );
    TestServer::start_with(None, store, ai).await
}

#[tokio::test]
async fn test_generate_accept_materializes_once() {
    let server = seeded_server().await;
    let client = Client::new();

    let (status, created) = post(
        &client,
        server.http_url("/api/ai/suggestions"),
        json!({"childId": "c1", "kinds": ["task", "learningGoal"]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let created = created.as_array().unwrap().clone();
    // Invalid candidate skipped
    assert_eq!(created.len(), 3);
    assert!(created.iter().all(|s| s["status"] == "new"));

    let task = created
        .iter()
        .find(|s| s["payload"]["title"] == "Tidy the bookshelf")
        .unwrap();
    let id = task["id"].as_str().unwrap();

    let (status, acceptance) = post(
        &client,
        server.http_url(&format!("/api/ai/suggestions/{}/accept", id)),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acceptance["suggestion"]["status"], "accepted");
    assert!(acceptance["suggestion"]["acceptedAt"].is_string());
    assert_eq!(acceptance["entity"]["entityType"], "chore_template");
    assert_eq!(acceptance["entity"]["name"], "Tidy the bookshelf");
    assert_eq!(acceptance["entity"]["pointValue"], 15);
    assert_eq!(acceptance["entity"]["icon"], "📚");
    assert_eq!(acceptance["entity"]["parentId"], "p1");

    // Second accept is refused and writes nothing
    let (status, _) = post(
        &client,
        server.http_url(&format!("/api/ai/suggestions/{}/accept", id)),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, templates) = get(&client, server.http_url("/api/parents/p1/chore-templates")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(templates.as_array().unwrap().len(), 1);
    assert_eq!(templates[0]["sourceSuggestionId"], id);

    let (_, remaining) = get(
        &client,
        server.http_url("/api/ai/suggestions?childId=c1&status=new"),
    )
    .await;
    assert_eq!(remaining.as_array().unwrap().len(), 2);

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_accepts_exactly_one_wins() {
    let server = seeded_server().await;
    let client = Client::new();

    let (_, created) = post(
        &client,
        server.http_url("/api/ai/suggestions"),
        json!({"childId": "c1", "kinds": ["task"], "params": {"count": 1}}),
    )
    .await;
    assert_eq!(created.as_array().unwrap().len(), 1);
    let url = server.http_url(&format!(
        "/api/ai/suggestions/{}/accept",
        created[0]["id"].as_str().unwrap()
    ));

    let (a, b) = tokio::join!(
        post(&client, url.clone(), json!({})),
        post(&client, url.clone(), json!({}))
    );
    let mut statuses = vec![a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);
    assert_eq!(server.store.template_count().await, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_learning_goal_assign_to_sibling() {
    let server = seeded_server().await;
    let client = Client::new();

    let (_, created) = post(
        &client,
        server.http_url("/api/ai/suggestions"),
        json!({"childId": "c1", "kinds": ["learning_goal"]}),
    )
    .await;
    let id = created[0]["id"].as_str().unwrap().to_string();

    // Another family's child is not a valid target
    let (status, _) = post(
        &client,
        server.http_url(&format!("/api/ai/suggestions/{}/assign", id)),
        json!({"childId": "x9"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, acceptance) = post(
        &client,
        server.http_url(&format!("/api/ai/suggestions/{}/assign", id)),
        json!({"childId": "c2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acceptance["entity"]["entityType"], "learning_goal");
    assert_eq!(acceptance["entity"]["childId"], "c2");
    assert_eq!(acceptance["entity"]["targetUnits"], 4);
    assert_eq!(acceptance["entity"]["pointsPerUnit"], 1);

    let (_, goals) = get(&client, server.http_url("/api/children/c2/learning-goals")).await;
    assert_eq!(goals.as_array().unwrap().len(), 1);
    let (_, goals) = get(&client, server.http_url("/api/children/c1/learning-goals")).await;
    assert!(goals.as_array().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_dismiss_is_terminal() {
    let server = seeded_server().await;
    let client = Client::new();

    let (_, created) = post(
        &client,
        server.http_url("/api/ai/suggestions"),
        json!({"childId": "c1", "kinds": ["task"], "params": {"count": 1}}),
    )
    .await;
    let id = created[0]["id"].as_str().unwrap().to_string();

    let (status, dismissed) = post(
        &client,
        server.http_url(&format!("/api/ai/suggestions/{}/dismiss", id)),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dismissed["status"], "dismissed");
    assert!(dismissed.get("acceptedAt").map_or(true, Value::is_null));

    let (status, _) = post(
        &client,
        server.http_url(&format!("/api/ai/suggestions/{}/accept", id)),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(server.store.template_count().await, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_generator_failure_persists_nothing() {
    let server = seeded_server().await;
    let client = Client::new();
    server.ai.set_fail_generation(true);

    let (status, body) = post(
        &client,
        server.http_url("/api/ai/suggestions"),
        json!({"childId": "c1", "kinds": ["task", "learning_goal"]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());

    let (_, listed) = get(&client, server.http_url("/api/ai/suggestions?childId=c1")).await;
    assert!(listed.as_array().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_jwt_callers_are_scoped_to_their_family() {
    let store = Arc::new(MemoryStore::new());
    seed_family(&store).await;
    let ai = Arc::new(MockAiProvider::new().with_candidates(
        SuggestionKind::Exercise,
        vec![json!({"activity": "Bike ride", "pointsReward": 8})],
    ));
    let server = TestServer::start_with(Some(SECRET), store, ai).await;
    let client = Client::new();

    let parent = encode_jwt(&Party::parent("p1"), "Alex", SECRET, 600).unwrap();
    let stranger = encode_jwt(&Party::parent("p2"), "Kim", SECRET, 600).unwrap();
    let child = encode_jwt(&Party::child("c1"), "Sam", SECRET, 600).unwrap();
    let generate = json!({"childId": "c1", "kinds": ["exercise"]});

    let resp = client
        .post(server.http_url("/api/ai/suggestions"))
        .json(&generate)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client
        .post(server.http_url("/api/ai/suggestions"))
        .bearer_auth(&stranger)
        .json(&generate)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = client
        .post(server.http_url("/api/ai/suggestions"))
        .bearer_auth(&parent)
        .json(&generate)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = resp.json().await.unwrap();
    let id = created[0]["id"].as_str().unwrap();

    // The child sees its own suggestions
    let resp = client
        .get(server.http_url("/api/ai/suggestions?childId=c1"))
        .bearer_auth(&child)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .post(server.http_url(&format!("/api/ai/suggestions/{}/accept", id)))
        .bearer_auth(&parent)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let acceptance: Value = resp.json().await.unwrap();
    assert_eq!(acceptance["entity"]["category"], "exercise");
    assert_eq!(acceptance["entity"]["icon"], "dumbbell");

    server.stop().await;
}
