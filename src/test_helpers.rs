//! Test helper factories and mock state builders
//!
//! Provides convenience functions for creating test objects with sensible defaults,
//! and helpers for building a fully wired `ServerState` on in-memory backends.
#![allow(dead_code)]

use crate::ai::MockAiProvider;
use crate::api::handlers::{ServerState, SharedState};
use crate::store::models::{ChildProfile, ChoreTemplate};
use crate::store::{FamilyStore, MemoryStore};
use crate::{AiProviderKind, AuthConfig, Config, StorageBackend};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-secret-key-minimum-32-chars!!";

// ============================================================================
// Mock state builders
// ============================================================================

/// Config for in-memory tests; `jwt_secret` None means open mode
pub fn test_config(jwt_secret: Option<&str>) -> Config {
    Config {
        server_port: 0,
        allowed_origins: Vec::new(),
        storage_backend: StorageBackend::Memory,
        database_url: "sqlite::memory:".to_string(),
        ai_provider: AiProviderKind::Mock,
        ai_url: None,
        ai_model: "mock".to_string(),
        ai_api_key: None,
        chat_history_limit: 50,
        chat_context_limit: 20,
        auth_config: jwt_secret.map(|secret| AuthConfig {
            jwt_secret: secret.to_string(),
            jwt_expiry_secs: 3600,
        }),
    }
}

/// Server state plus handles on its in-memory collaborators
pub struct MockServer {
    pub state: SharedState,
    pub store: Arc<MemoryStore>,
    pub ai: Arc<MockAiProvider>,
}

/// Build a server state over a `MemoryStore` and a `MockAiProvider`
pub fn mock_server(jwt_secret: Option<&str>) -> MockServer {
    let store = Arc::new(MemoryStore::new());
    let ai = Arc::new(MockAiProvider::new());
    let state = Arc::new(ServerState::from_config(
        &test_config(jwt_secret),
        store.clone(),
        ai.clone(),
        ai.clone(),
    ));
    MockServer { state, store, ai }
}

/// Mock server with parent `p1` owning children `c1` and `c2`, and parent
/// `p2` owning `x9`
pub async fn seeded_mock_server(jwt_secret: Option<&str>) -> MockServer {
    let server = mock_server(jwt_secret);
    for (child, parent) in [("c1", "p1"), ("c2", "p1"), ("x9", "p2")] {
        server
            .store
            .upsert_child(&sample_child(child, parent))
            .await
            .unwrap();
    }
    server
}

// ============================================================================
// Entity factories
// ============================================================================

pub fn sample_child(id: &str, parent_id: &str) -> ChildProfile {
    ChildProfile {
        id: id.to_string(),
        parent_id: parent_id.to_string(),
        name: format!("Child {}", id),
        age: Some(9),
        created_at: Utc::now(),
    }
}

pub fn sample_template(parent_id: &str) -> ChoreTemplate {
    ChoreTemplate {
        id: Uuid::new_v4(),
        parent_id: parent_id.to_string(),
        name: "Feed the cat".to_string(),
        description: Some("Morning and evening".to_string()),
        point_value: 10,
        icon: "star".to_string(),
        category: "chores".to_string(),
        source_suggestion_id: None,
        created_at: Utc::now(),
    }
}
