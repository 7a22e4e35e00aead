//! In-memory FamilyStore
//!
//! All tables live behind a single `tokio::sync::RwLock` so that
//! conditional transitions and their side effects are applied together.

use super::models::*;
use super::traits::FamilyStore;
use crate::chat::types::{ChatMessage, Party};
use crate::suggestions::models::{Suggestion, SuggestionKind, SuggestionStatus};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    children: HashMap<String, ChildProfile>,
    messages: HashMap<Party, Vec<ChatMessage>>,
    suggestions: HashMap<Uuid, Suggestion>,
    /// Insertion order of suggestion ids
    suggestion_order: Vec<Uuid>,
    templates: HashMap<Uuid, ChoreTemplate>,
    template_order: Vec<Uuid>,
    goals: Vec<LearningGoal>,
    assignments: Vec<ChoreAssignment>,
}

/// In-memory implementation of FamilyStore.
///
/// # Example
///
/// ```rust
/// use chore_quest::store::models::ChildProfile;
/// use chore_quest::store::{FamilyStore, MemoryStore};
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// let child = ChildProfile {
///     id: "c1".to_string(),
///     parent_id: "p1".to_string(),
///     name: "Sam".to_string(),
///     age: Some(9),
///     created_at: chrono::Utc::now(),
/// };
/// store.upsert_child(&child).await.unwrap();
/// assert_eq!(store.get_child("c1").await.unwrap(), Some(child));
/// assert!(store.get_child("c2").await.unwrap().is_none());
/// # });
/// ```
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, simulating an unavailable database
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("store unavailable");
        }
        Ok(())
    }

    /// Number of chore templates across all parents
    pub async fn template_count(&self) -> usize {
        self.tables.read().await.templates.len()
    }

    /// Number of learning goals across all children
    pub async fn goal_count(&self) -> usize {
        self.tables.read().await.goals.len()
    }
}

#[async_trait]
impl FamilyStore for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        self.check_writable()
    }

    async fn upsert_child(&self, child: &ChildProfile) -> Result<()> {
        self.check_writable()?;
        self.tables
            .write()
            .await
            .children
            .insert(child.id.clone(), child.clone());
        Ok(())
    }

    async fn get_child(&self, id: &str) -> Result<Option<ChildProfile>> {
        Ok(self.tables.read().await.children.get(id).cloned())
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<()> {
        self.check_writable()?;
        self.tables
            .write()
            .await
            .messages
            .entry(message.party.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn recent_messages(&self, party: &Party, limit: usize) -> Result<Vec<ChatMessage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .get(party)
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn create_suggestions(&self, suggestions: &[Suggestion]) -> Result<()> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        for suggestion in suggestions {
            tables.suggestion_order.push(suggestion.id);
            tables.suggestions.insert(suggestion.id, suggestion.clone());
        }
        Ok(())
    }

    async fn get_suggestion(&self, id: Uuid) -> Result<Option<Suggestion>> {
        Ok(self.tables.read().await.suggestions.get(&id).cloned())
    }

    async fn list_suggestions(
        &self,
        child_id: &str,
        status: Option<SuggestionStatus>,
        kind: Option<SuggestionKind>,
    ) -> Result<Vec<Suggestion>> {
        let tables = self.tables.read().await;
        Ok(tables
            .suggestion_order
            .iter()
            .rev()
            .filter_map(|id| tables.suggestions.get(id))
            .filter(|s| s.child_id == child_id)
            .filter(|s| status.is_none_or(|st| s.status == st))
            .filter(|s| kind.is_none_or(|k| s.kind == k))
            .cloned()
            .collect())
    }

    async fn commit_acceptance(
        &self,
        id: Uuid,
        materialization: &Materialization,
        accepted_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let Some(suggestion) = tables.suggestions.get_mut(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if suggestion.status != SuggestionStatus::New {
            return Ok(TransitionOutcome::AlreadyResolved(suggestion.status));
        }
        suggestion.status = SuggestionStatus::Accepted;
        suggestion.accepted_at = Some(accepted_at);
        suggestion.resolved_at = Some(accepted_at);

        match &materialization.entity {
            MaterializedEntity::ChoreTemplate(template) => {
                tables.template_order.push(template.id);
                tables.templates.insert(template.id, template.clone());
            }
            MaterializedEntity::LearningGoal(goal) => tables.goals.push(goal.clone()),
        }
        if let Some(assignment) = &materialization.assignment {
            tables.assignments.push(assignment.clone());
        }
        Ok(TransitionOutcome::Applied)
    }

    async fn mark_dismissed(
        &self,
        id: Uuid,
        resolved_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;
        let Some(suggestion) = tables.suggestions.get_mut(&id) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if suggestion.status != SuggestionStatus::New {
            return Ok(TransitionOutcome::AlreadyResolved(suggestion.status));
        }
        suggestion.status = SuggestionStatus::Dismissed;
        suggestion.resolved_at = Some(resolved_at);
        Ok(TransitionOutcome::Applied)
    }

    async fn get_chore_template(&self, id: Uuid) -> Result<Option<ChoreTemplate>> {
        Ok(self.tables.read().await.templates.get(&id).cloned())
    }

    async fn list_chore_templates(&self, parent_id: &str) -> Result<Vec<ChoreTemplate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .template_order
            .iter()
            .rev()
            .filter_map(|id| tables.templates.get(id))
            .filter(|t| t.parent_id == parent_id)
            .cloned()
            .collect())
    }

    async fn list_learning_goals(&self, child_id: &str) -> Result<Vec<LearningGoal>> {
        let tables = self.tables.read().await;
        Ok(tables
            .goals
            .iter()
            .rev()
            .filter(|g| g.child_id == child_id)
            .cloned()
            .collect())
    }

    async fn list_assignments(&self, child_id: &str) -> Result<Vec<ChoreAssignment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .assignments
            .iter()
            .rev()
            .filter(|a| a.child_id == child_id)
            .cloned()
            .collect())
    }
}
