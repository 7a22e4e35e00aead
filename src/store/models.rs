//! Persistent family entities owned by the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::suggestions::models::SuggestionStatus;

/// A child profile. Only what this service needs: who the parent is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildProfile {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// Reusable chore definition owned by a parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoreTemplate {
    pub id: Uuid,
    pub parent_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub point_value: i64,
    pub icon: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_suggestion_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Learning goal owned by a child, scored per completed unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningGoal {
    pub id: Uuid,
    pub child_id: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    pub target_units: i64,
    pub points_per_unit: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_suggestion_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Links a chore template to a specific child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoreAssignment {
    pub id: Uuid,
    pub template_id: Uuid,
    pub child_id: String,
    pub created_at: DateTime<Utc>,
}

impl ChoreAssignment {
    pub fn new(template_id: Uuid, child_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            template_id,
            child_id: child_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// The durable entity produced by accepting a suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entityType", rename_all = "snake_case")]
pub enum MaterializedEntity {
    ChoreTemplate(ChoreTemplate),
    LearningGoal(LearningGoal),
}

impl MaterializedEntity {
    pub fn id(&self) -> Uuid {
        match self {
            MaterializedEntity::ChoreTemplate(t) => t.id,
            MaterializedEntity::LearningGoal(g) => g.id,
        }
    }
}

/// Outcome of a conditional status transition (`new` → terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    AlreadyResolved(SuggestionStatus),
    NotFound,
}

/// Everything one acceptance writes, committed together with the status flip
#[derive(Debug, Clone, PartialEq)]
pub struct Materialization {
    pub entity: MaterializedEntity,
    pub assignment: Option<ChoreAssignment>,
}
