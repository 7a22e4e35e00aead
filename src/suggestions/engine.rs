//! Suggestion engine
//!
//! Owns the suggestion lifecycle: `new` → `accepted` | `dismissed`.
//! Every transition is guarded twice: a read-time check that gives callers a
//! precise error before any work is done, and the store's conditional
//! update, which makes concurrent transitions on one id linearizable.

use chrono::Utc;
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::materializer::{MaterializeContext, Materializer};
use super::models::{Acceptance, GenerateParams, Suggestion, SuggestionKind, SuggestionStatus};
use super::normalize::normalize;
use super::SuggestionError;
use crate::ai::SuggestionGenerator;
use crate::events::{CrudAction, CrudEvent, EntityType, EventEmitter};
use crate::store::models::{ChildProfile, MaterializedEntity, TransitionOutcome};
use crate::store::FamilyStore;

pub struct SuggestionEngine {
    store: Arc<dyn FamilyStore>,
    generator: Arc<dyn SuggestionGenerator>,
    events: Arc<dyn EventEmitter>,
    materializer: Materializer,
}

impl SuggestionEngine {
    pub fn new(
        store: Arc<dyn FamilyStore>,
        generator: Arc<dyn SuggestionGenerator>,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            store,
            generator,
            events,
            materializer: Materializer::new(),
        }
    }

    async fn require_child(&self, child_id: &str) -> Result<ChildProfile, SuggestionError> {
        self.store
            .get_child(child_id)
            .await?
            .ok_or_else(|| SuggestionError::NotFound(format!("Child {}", child_id)))
    }

    /// Load a suggestion that is still `new`
    async fn require_open(&self, id: Uuid) -> Result<Suggestion, SuggestionError> {
        let suggestion = self
            .store
            .get_suggestion(id)
            .await?
            .ok_or_else(|| SuggestionError::NotFound(format!("Suggestion {}", id)))?;
        if suggestion.status != SuggestionStatus::New {
            return Err(SuggestionError::AlreadyResolved {
                id,
                status: suggestion.status,
            });
        }
        Ok(suggestion)
    }

    /// Generate, validate and persist a batch of suggestions for a child.
    ///
    /// All generator calls must succeed before anything is written. Invalid
    /// candidates are skipped; an empty result is not an error.
    pub async fn generate(
        &self,
        child_id: &str,
        kinds: &[SuggestionKind],
        params: &GenerateParams,
    ) -> Result<Vec<Suggestion>, SuggestionError> {
        let mut unique_kinds: Vec<SuggestionKind> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            if !unique_kinds.contains(kind) {
                unique_kinds.push(*kind);
            }
        }
        if unique_kinds.is_empty() {
            return Err(SuggestionError::InvalidRequest(
                "At least one suggestion kind is required".to_string(),
            ));
        }

        let child = self.require_child(child_id).await?;
        let count = params.effective_count();

        let batches = try_join_all(unique_kinds.iter().map(|kind| {
            let generator = self.generator.clone();
            let child = &child;
            async move {
                generator
                    .generate_candidates(*kind, child, params)
                    .await
                    .map(|candidates| (*kind, candidates))
            }
        }))
        .await
        .map_err(SuggestionError::Generator)?;

        let mut created = Vec::new();
        for (kind, candidates) in batches {
            let total = candidates.len();
            let valid: Vec<Suggestion> = candidates
                .into_iter()
                .filter(|candidate| match normalize(kind, candidate) {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(child_id, kind = %kind, error = %e, "Skipping invalid suggestion candidate");
                        false
                    }
                })
                .take(count)
                .map(|payload| Suggestion::new(child.id.clone(), kind, payload))
                .collect();
            debug!(child_id, kind = %kind, total, kept = valid.len(), "Validated suggestion candidates");
            created.extend(valid);
        }

        if created.is_empty() {
            info!(child_id, "Generator produced no valid suggestions");
            return Ok(created);
        }

        self.store.create_suggestions(&created).await?;
        for suggestion in &created {
            self.events.emit(
                CrudEvent::new(
                    EntityType::Suggestion,
                    CrudAction::Created,
                    suggestion.id.to_string(),
                )
                .with_payload(serde_json::json!({"kind": suggestion.kind}))
                .with_child_id(child.id.clone())
                .with_parent_id(child.parent_id.clone()),
            );
        }
        info!(child_id, count = created.len(), "Suggestions generated");
        Ok(created)
    }

    /// Suggestions for a child, newest first
    pub async fn list(
        &self,
        child_id: &str,
        status: Option<SuggestionStatus>,
        kind: Option<SuggestionKind>,
    ) -> Result<Vec<Suggestion>, SuggestionError> {
        Ok(self.store.list_suggestions(child_id, status, kind).await?)
    }

    /// Open suggestions for a child
    pub async fn list_new(
        &self,
        child_id: &str,
        kind: Option<SuggestionKind>,
    ) -> Result<Vec<Suggestion>, SuggestionError> {
        self.list(child_id, Some(SuggestionStatus::New), kind).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Suggestion, SuggestionError> {
        self.store
            .get_suggestion(id)
            .await?
            .ok_or_else(|| SuggestionError::NotFound(format!("Suggestion {}", id)))
    }

    /// Accept a suggestion, materializing its entity exactly once
    pub async fn accept(&self, id: Uuid) -> Result<Acceptance, SuggestionError> {
        let suggestion = self.require_open(id).await?;
        let owner = self.require_child(&suggestion.child_id).await?;
        self.resolve_acceptance(suggestion, &owner, None).await
    }

    /// Accept a suggestion on behalf of a specific child of the same parent
    pub async fn assign(&self, id: Uuid, child_id: &str) -> Result<Acceptance, SuggestionError> {
        let suggestion = self.require_open(id).await?;
        let owner = self.require_child(&suggestion.child_id).await?;
        let assignee = self.require_child(child_id).await?;
        if assignee.parent_id != owner.parent_id {
            return Err(SuggestionError::InvalidRequest(format!(
                "Child {} does not belong to the same parent as child {}",
                assignee.id, owner.id
            )));
        }
        self.resolve_acceptance(suggestion, &owner, Some(&assignee))
            .await
    }

    async fn resolve_acceptance(
        &self,
        mut suggestion: Suggestion,
        owner: &ChildProfile,
        assignee: Option<&ChildProfile>,
    ) -> Result<Acceptance, SuggestionError> {
        let materialization = self.materializer.materialize(&MaterializeContext {
            suggestion: &suggestion,
            owner,
            assignee,
        })?;

        let accepted_at = Utc::now();
        match self
            .store
            .commit_acceptance(suggestion.id, &materialization, accepted_at)
            .await?
        {
            TransitionOutcome::Applied => {}
            TransitionOutcome::AlreadyResolved(status) => {
                return Err(SuggestionError::AlreadyResolved {
                    id: suggestion.id,
                    status,
                })
            }
            TransitionOutcome::NotFound => {
                return Err(SuggestionError::NotFound(format!(
                    "Suggestion {}",
                    suggestion.id
                )))
            }
        }

        suggestion.status = SuggestionStatus::Accepted;
        suggestion.accepted_at = Some(accepted_at);
        suggestion.resolved_at = Some(accepted_at);

        info!(
            suggestion_id = %suggestion.id,
            kind = %suggestion.kind,
            entity_id = %materialization.entity.id(),
            assigned_to = assignee.map(|c| c.id.as_str()),
            "Suggestion accepted"
        );
        self.emit_acceptance(&suggestion, owner, &materialization.entity, assignee);
        if let Some(assignment) = &materialization.assignment {
            self.events.emit(
                CrudEvent::new(
                    EntityType::ChoreAssignment,
                    CrudAction::Created,
                    assignment.id.to_string(),
                )
                .with_payload(serde_json::to_value(assignment).unwrap_or_default())
                .with_child_id(assignment.child_id.clone())
                .with_parent_id(owner.parent_id.clone()),
            );
        }

        Ok(Acceptance {
            suggestion,
            entity: materialization.entity,
            assignment: materialization.assignment,
        })
    }

    fn emit_acceptance(
        &self,
        suggestion: &Suggestion,
        owner: &ChildProfile,
        entity: &MaterializedEntity,
        assignee: Option<&ChildProfile>,
    ) {
        self.events.emit(
            CrudEvent::new(
                EntityType::Suggestion,
                CrudAction::Accepted,
                suggestion.id.to_string(),
            )
            .with_payload(serde_json::json!({"entityId": entity.id()}))
            .with_child_id(suggestion.child_id.clone())
            .with_parent_id(owner.parent_id.clone()),
        );

        let payload = serde_json::to_value(entity).unwrap_or_default();
        let event = match entity {
            MaterializedEntity::ChoreTemplate(t) => {
                CrudEvent::new(EntityType::ChoreTemplate, CrudAction::Created, t.id.to_string())
                    .with_parent_id(t.parent_id.clone())
            }
            MaterializedEntity::LearningGoal(g) => {
                CrudEvent::new(EntityType::LearningGoal, CrudAction::Created, g.id.to_string())
                    .with_child_id(assignee.unwrap_or(owner).id.clone())
                    .with_parent_id(owner.parent_id.clone())
            }
        };
        self.events.emit(event.with_payload(payload));
    }

    /// Dismiss a suggestion. Never materializes anything.
    pub async fn dismiss(&self, id: Uuid) -> Result<Suggestion, SuggestionError> {
        let mut suggestion = self.require_open(id).await?;
        let resolved_at = Utc::now();
        match self.store.mark_dismissed(id, resolved_at).await? {
            TransitionOutcome::Applied => {}
            TransitionOutcome::AlreadyResolved(status) => {
                return Err(SuggestionError::AlreadyResolved { id, status })
            }
            TransitionOutcome::NotFound => {
                return Err(SuggestionError::NotFound(format!("Suggestion {}", id)))
            }
        }
        suggestion.status = SuggestionStatus::Dismissed;
        suggestion.resolved_at = Some(resolved_at);

        info!(suggestion_id = %id, "Suggestion dismissed");
        let mut event = CrudEvent::new(EntityType::Suggestion, CrudAction::Dismissed, id.to_string())
            .with_child_id(suggestion.child_id.clone());
        if let Ok(Some(child)) = self.store.get_child(&suggestion.child_id).await {
            event = event.with_parent_id(child.parent_id);
        }
        self.events.emit(event);
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockAiProvider;
    use crate::events::EventBus;
    use crate::store::MemoryStore;
    use crate::test_helpers::sample_child;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        ai: Arc<MockAiProvider>,
        bus: EventBus,
        engine: Arc<SuggestionEngine>,
    }

    async fn fixture(ai: MockAiProvider) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store.upsert_child(&sample_child("c1", "p1")).await.unwrap();
        store.upsert_child(&sample_child("c2", "p1")).await.unwrap();
        store.upsert_child(&sample_child("x9", "p2")).await.unwrap();
        let ai = Arc::new(ai);
        let bus = EventBus::default();
        let engine = Arc::new(SuggestionEngine::new(
            store.clone(),
            ai.clone(),
            Arc::new(bus.clone()),
        ));
        Fixture {
            store,
            ai,
            bus,
            engine,
        }
    }

    async fn seeded(f: &Fixture, kind: SuggestionKind, payload: serde_json::Value) -> Suggestion {
        let suggestion = Suggestion::new("c1", kind, payload);
        f.store
            .create_suggestions(std::slice::from_ref(&suggestion))
            .await
            .unwrap();
        suggestion
    }

    #[tokio::test]
    async fn test_generate_skips_malformed_candidates() {
        let f = fixture(MockAiProvider::new().with_candidates(
            SuggestionKind::Exercise,
            vec![
                json!({"activity": "Jumping jacks", "pointsReward": 5}),
                json!({"title": "Bike ride", "pointValue": "15"}),
                json!({"description": "no name or points"}),
            ],
        ))
        .await;

        let created = f
            .engine
            .generate("c1", &[SuggestionKind::Exercise], &GenerateParams::with_count(3))
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|s| s.status == SuggestionStatus::New));

        let listed = f.engine.list_new("c1", None).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_respects_count() {
        let candidates = (1..=6)
            .map(|i| json!({"name": format!("Chore {i}"), "pointValue": i}))
            .collect();
        let f = fixture(MockAiProvider::new().with_candidates(SuggestionKind::Task, candidates)).await;

        let created = f
            .engine
            .generate("c1", &[SuggestionKind::Task], &GenerateParams::with_count(2))
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
    }

    #[tokio::test]
    async fn test_generate_zero_valid_is_empty_ok() {
        let f = fixture(
            MockAiProvider::new().with_candidates(SuggestionKind::Task, vec![json!({"bogus": 1})]),
        )
        .await;
        let created = f
            .engine
            .generate("c1", &[SuggestionKind::Task], &GenerateParams::default())
            .await
            .unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_generate_failure_persists_nothing() {
        let f = fixture(MockAiProvider::new().with_candidates(
            SuggestionKind::Task,
            vec![json!({"name": "Dishes", "pointValue": 3})],
        ))
        .await;
        f.ai.set_fail_generation(true);

        let err = f
            .engine
            .generate(
                "c1",
                &[SuggestionKind::Task, SuggestionKind::LearningGoal],
                &GenerateParams::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SuggestionError::Generator(_)));
        assert!(f.engine.list("c1", None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generate_validates_request() {
        let f = fixture(MockAiProvider::new()).await;
        assert!(matches!(
            f.engine.generate("c1", &[], &GenerateParams::default()).await,
            Err(SuggestionError::InvalidRequest(_))
        ));
        assert!(matches!(
            f.engine
                .generate("ghost", &[SuggestionKind::Task], &GenerateParams::default())
                .await,
            Err(SuggestionError::NotFound(_))
        ));
        assert_eq!(f.ai.generate_calls(), 0);
    }

    #[tokio::test]
    async fn test_accept_task_creates_template_from_loose_fields() {
        let f = fixture(MockAiProvider::new()).await;
        let mut rx = f.bus.subscribe();
        let suggestion = seeded(
            &f,
            SuggestionKind::Task,
            json!({"subject": "Sweep porch", "pointsReward": 20}),
        )
        .await;

        let acceptance = f.engine.accept(suggestion.id).await.unwrap();
        assert_eq!(acceptance.suggestion.status, SuggestionStatus::Accepted);
        assert!(acceptance.suggestion.accepted_at.is_some());
        match &acceptance.entity {
            MaterializedEntity::ChoreTemplate(t) => {
                assert_eq!(t.name, "Sweep porch");
                assert_eq!(t.point_value, 20);
                assert_eq!(t.parent_id, "p1");
            }
            other => panic!("Expected chore template, got {:?}", other),
        }

        let first = rx.try_recv().unwrap();
        assert_eq!(first.entity_type, EntityType::Suggestion);
        assert_eq!(first.action, CrudAction::Accepted);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.entity_type, EntityType::ChoreTemplate);
    }

    #[tokio::test]
    async fn test_accept_twice_is_already_resolved() {
        let f = fixture(MockAiProvider::new()).await;
        let suggestion = seeded(
            &f,
            SuggestionKind::LearningGoal,
            json!({"subject": "Reading", "suggestedTargetUnits": 10, "pointsPerUnit": 2}),
        )
        .await;

        f.engine.accept(suggestion.id).await.unwrap();
        let err = f.engine.accept(suggestion.id).await.unwrap_err();
        assert!(matches!(
            err,
            SuggestionError::AlreadyResolved {
                status: SuggestionStatus::Accepted,
                ..
            }
        ));
        assert_eq!(f.store.goal_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_accepts_materialize_once() {
        let f = fixture(MockAiProvider::new()).await;
        let suggestion = seeded(
            &f,
            SuggestionKind::Task,
            json!({"name": "Walk the dog", "pointValue": 10}),
        )
        .await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = f.engine.clone();
                tokio::spawn(async move { engine.accept(suggestion.id).await })
            })
            .collect();

        let mut ok = 0;
        let mut resolved = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(SuggestionError::AlreadyResolved { .. }) => resolved += 1,
                Err(other) => panic!("Unexpected error: {other}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(resolved, 7);
        assert_eq!(f.store.template_count().await, 1);
    }

    #[tokio::test]
    async fn test_materialization_failure_leaves_suggestion_open() {
        let f = fixture(MockAiProvider::new()).await;
        let suggestion = seeded(&f, SuggestionKind::Task, json!({"name": "No points"})).await;

        let err = f.engine.accept(suggestion.id).await.unwrap_err();
        assert!(matches!(err, SuggestionError::Materialization(_)));
        let stored = f.engine.get(suggestion.id).await.unwrap();
        assert_eq!(stored.status, SuggestionStatus::New);
        assert_eq!(f.store.template_count().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_on_commit_leaves_suggestion_open() {
        let f = fixture(MockAiProvider::new()).await;
        let suggestion = seeded(
            &f,
            SuggestionKind::Task,
            json!({"name": "Dishes", "pointValue": 2}),
        )
        .await;

        f.store.set_fail_writes(true);
        assert!(matches!(
            f.engine.accept(suggestion.id).await,
            Err(SuggestionError::Store(_))
        ));
        f.store.set_fail_writes(false);

        assert_eq!(
            f.engine.get(suggestion.id).await.unwrap().status,
            SuggestionStatus::New
        );
        assert!(f.engine.accept(suggestion.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_dismiss_never_materializes() {
        let f = fixture(MockAiProvider::new()).await;
        let suggestion = seeded(
            &f,
            SuggestionKind::Task,
            json!({"name": "Dishes", "pointValue": 2}),
        )
        .await;

        let dismissed = f.engine.dismiss(suggestion.id).await.unwrap();
        assert_eq!(dismissed.status, SuggestionStatus::Dismissed);
        assert!(dismissed.accepted_at.is_none());
        assert_eq!(f.store.template_count().await, 0);

        assert!(matches!(
            f.engine.accept(suggestion.id).await,
            Err(SuggestionError::AlreadyResolved {
                status: SuggestionStatus::Dismissed,
                ..
            })
        ));
        assert!(matches!(
            f.engine.dismiss(Uuid::new_v4()).await,
            Err(SuggestionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_assign_creates_assignment_for_sibling() {
        let f = fixture(MockAiProvider::new()).await;
        let suggestion = seeded(
            &f,
            SuggestionKind::Exercise,
            json!({"activity": "Stretching", "points": 4}),
        )
        .await;

        let acceptance = f.engine.assign(suggestion.id, "c2").await.unwrap();
        let assignment = acceptance.assignment.expect("assignment");
        assert_eq!(assignment.child_id, "c2");
        assert_eq!(assignment.template_id, acceptance.entity.id());
        assert_eq!(f.store.list_assignments("c2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_assign_rejects_foreign_child() {
        let f = fixture(MockAiProvider::new()).await;
        let suggestion = seeded(
            &f,
            SuggestionKind::Task,
            json!({"name": "Dishes", "pointValue": 2}),
        )
        .await;

        assert!(matches!(
            f.engine.assign(suggestion.id, "x9").await,
            Err(SuggestionError::InvalidRequest(_))
        ));
        assert!(matches!(
            f.engine.assign(suggestion.id, "ghost").await,
            Err(SuggestionError::NotFound(_))
        ));
        assert_eq!(
            f.engine.get(suggestion.id).await.unwrap().status,
            SuggestionStatus::New
        );
    }
}
