//! FamilyStore trait definition
//!
//! Abstract persistence interface for chat history, suggestions, child
//! profiles and the entities materialized from accepted suggestions.
//! Implemented by `SqliteStore` (durable) and `MemoryStore` (tests, demos).

use super::models::*;
use crate::chat::types::{ChatMessage, Party};
use crate::suggestions::models::{Suggestion, SuggestionKind, SuggestionStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[async_trait]
pub trait FamilyStore: Send + Sync {
    /// Liveness check used by `/health`
    async fn health_check(&self) -> Result<()>;

    // ========================================================================
    // Child profiles
    // ========================================================================

    async fn upsert_child(&self, child: &ChildProfile) -> Result<()>;

    async fn get_child(&self, id: &str) -> Result<Option<ChildProfile>>;

    // ========================================================================
    // Chat history (append-only)
    // ========================================================================

    async fn append_message(&self, message: &ChatMessage) -> Result<()>;

    /// Up to `limit` messages for `party`, newest first
    async fn recent_messages(&self, party: &Party, limit: usize) -> Result<Vec<ChatMessage>>;

    // ========================================================================
    // Suggestions
    // ========================================================================

    /// Persist a batch in one write; either all rows land or none do
    async fn create_suggestions(&self, suggestions: &[Suggestion]) -> Result<()>;

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<Suggestion>>;

    /// Suggestions for a child, newest first, optionally filtered
    async fn list_suggestions(
        &self,
        child_id: &str,
        status: Option<SuggestionStatus>,
        kind: Option<SuggestionKind>,
    ) -> Result<Vec<Suggestion>>;

    /// Flip `new` → `accepted` and write the materialized rows as one unit.
    ///
    /// Nothing is written unless the suggestion is still `new`.
    async fn commit_acceptance(
        &self,
        id: Uuid,
        materialization: &Materialization,
        accepted_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome>;

    /// Flip `new` → `dismissed`. Never writes anything else.
    async fn mark_dismissed(&self, id: Uuid, resolved_at: DateTime<Utc>)
        -> Result<TransitionOutcome>;

    // ========================================================================
    // Materialized entities
    // ========================================================================

    async fn get_chore_template(&self, id: Uuid) -> Result<Option<ChoreTemplate>>;

    async fn list_chore_templates(&self, parent_id: &str) -> Result<Vec<ChoreTemplate>>;

    async fn list_learning_goals(&self, child_id: &str) -> Result<Vec<LearningGoal>>;

    async fn list_assignments(&self, child_id: &str) -> Result<Vec<ChoreAssignment>>;
}
