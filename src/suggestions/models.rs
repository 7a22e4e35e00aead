//! Suggestion domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::store::models::{ChoreAssignment, MaterializedEntity};

/// What an accepted suggestion turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    Task,
    Exercise,
    #[serde(alias = "learningGoal")]
    LearningGoal,
}

impl SuggestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionKind::Task => "task",
            SuggestionKind::Exercise => "exercise",
            SuggestionKind::LearningGoal => "learning_goal",
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "task" => Ok(SuggestionKind::Task),
            "exercise" => Ok(SuggestionKind::Exercise),
            "learning_goal" | "learningGoal" => Ok(SuggestionKind::LearningGoal),
            other => Err(format!("Unknown suggestion kind: {}", other)),
        }
    }
}

/// Lifecycle status. `Accepted` and `Dismissed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    New,
    Accepted,
    Dismissed,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::New => "new",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Dismissed => "dismissed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SuggestionStatus::New)
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "new" => Ok(SuggestionStatus::New),
            "accepted" => Ok(SuggestionStatus::Accepted),
            "dismissed" => Ok(SuggestionStatus::Dismissed),
            other => Err(format!("Unknown suggestion status: {}", other)),
        }
    }
}

/// An AI-proposed candidate awaiting a human decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: Uuid,
    pub child_id: String,
    pub kind: SuggestionKind,
    /// Raw generator output; field names are normalized on use
    pub payload: serde_json::Value,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Suggestion {
    pub fn new(child_id: impl Into<String>, kind: SuggestionKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            child_id: child_id.into(),
            kind,
            payload,
            status: SuggestionStatus::New,
            created_at: Utc::now(),
            accepted_at: None,
            resolved_at: None,
        }
    }
}

/// Generation parameters forwarded to the AI collaborator.
///
/// `count` caps the number of valid candidates kept per kind; everything
/// else is passed through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateParams {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GenerateParams {
    pub const DEFAULT_COUNT: usize = 3;
    pub const MAX_COUNT: usize = 10;

    pub fn with_count(count: usize) -> Self {
        Self {
            count: Some(count),
            extra: serde_json::Map::new(),
        }
    }

    /// Requested count clamped to `1..=MAX_COUNT`
    pub fn effective_count(&self) -> usize {
        self.count
            .unwrap_or(Self::DEFAULT_COUNT)
            .clamp(1, Self::MAX_COUNT)
    }
}

/// Result of `accept` / `assign`: the materialized entity and, for assign,
/// the child-specific assignment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    pub suggestion: Suggestion,
    pub entity: MaterializedEntity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<ChoreAssignment>,
}
