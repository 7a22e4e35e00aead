//! CRUD event types for WebSocket notifications

use serde::{Deserialize, Serialize};

use crate::chat::types::{Party, PartyType};

/// The type of entity that was mutated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Child,
    Suggestion,
    ChoreTemplate,
    LearningGoal,
    ChoreAssignment,
}

/// The CRUD action performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrudAction {
    Created,
    Accepted,
    Dismissed,
}

/// A CRUD event emitted after a successful mutation
///
/// Must be Clone for `tokio::sync::broadcast`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrudEvent {
    pub entity_type: EntityType,
    pub action: CrudAction,
    pub entity_id: String,
    /// Optional payload with entity data
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    /// ISO 8601 timestamp
    pub timestamp: String,
    /// Child the entity concerns, for subscriber filtering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_id: Option<String>,
    /// Parent the entity concerns, for subscriber filtering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl CrudEvent {
    pub fn new(entity_type: EntityType, action: CrudAction, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            action,
            entity_id: entity_id.into(),
            payload: serde_json::Value::Null,
            timestamp: chrono::Utc::now().to_rfc3339(),
            child_id: None,
            parent_id: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_child_id(mut self, child_id: impl Into<String>) -> Self {
        self.child_id = Some(child_id.into());
        self
    }

    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Whether a subscriber bound to `party` should see this event.
    ///
    /// Children see events about themselves; parents see events tagged with
    /// their id (every child-scoped event carries the owning parent too).
    pub fn is_visible_to(&self, party: &Party) -> bool {
        match party.party_type {
            PartyType::Child => self.child_id.as_deref() == Some(party.party_id.as_str()),
            PartyType::Parent => self.parent_id.as_deref() == Some(party.party_id.as_str()),
        }
    }
}

/// Sink for CRUD events. Emitting is fire-and-forget.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: CrudEvent);

    fn emit_created(
        &self,
        entity_type: EntityType,
        entity_id: &str,
        payload: serde_json::Value,
        child_id: Option<String>,
        parent_id: Option<String>,
    ) {
        let mut event =
            CrudEvent::new(entity_type, CrudAction::Created, entity_id).with_payload(payload);
        event.child_id = child_id;
        event.parent_id = parent_id;
        self.emit(event);
    }
}
