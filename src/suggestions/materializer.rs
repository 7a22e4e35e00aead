//! Suggestion materializer
//!
//! Turns an accepted suggestion into the durable entity it describes. One
//! handler per kind, registered in a lookup table. The materializer only
//! builds rows; writing them together with the status flip is the store's
//! job, and the one-shot guarantee comes from the engine's status guard.

use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{Suggestion, SuggestionKind};
use super::normalize::{normalize, NormalizeError, NormalizedPayload};
use crate::store::models::{
    ChildProfile, ChoreAssignment, ChoreTemplate, LearningGoal, Materialization,
    MaterializedEntity,
};

/// Inputs shared by every handler
pub struct MaterializeContext<'a> {
    pub suggestion: &'a Suggestion,
    /// The child the suggestion was generated for
    pub owner: &'a ChildProfile,
    /// Set by `assign`: the child that receives the entity
    pub assignee: Option<&'a ChildProfile>,
}

impl MaterializeContext<'_> {
    fn target_child(&self) -> &ChildProfile {
        self.assignee.unwrap_or(self.owner)
    }
}

type MaterializeFn = fn(&MaterializeContext<'_>, &NormalizedPayload) -> MaterializedEntity;

pub struct Materializer {
    handlers: HashMap<SuggestionKind, MaterializeFn>,
}

impl Default for Materializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Materializer {
    pub fn new() -> Self {
        let mut handlers: HashMap<SuggestionKind, MaterializeFn> = HashMap::new();
        handlers.insert(SuggestionKind::Task, materialize_task);
        handlers.insert(SuggestionKind::Exercise, materialize_exercise);
        handlers.insert(SuggestionKind::LearningGoal, materialize_learning_goal);
        Self { handlers }
    }

    /// Build the rows for accepting (or assigning) a suggestion.
    ///
    /// When an assignee is given and the entity is a chore template, a
    /// `ChoreAssignment` linking the template to the assignee is produced too.
    pub fn materialize(
        &self,
        ctx: &MaterializeContext<'_>,
    ) -> Result<Materialization, NormalizeError> {
        let kind = ctx.suggestion.kind;
        let normalized = normalize(kind, &ctx.suggestion.payload)?;
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(NormalizeError::Invalid {
                field: "kind",
                reason: "no materializer registered",
            })?;

        let entity = handler(ctx, &normalized);
        let assignment = match (&entity, ctx.assignee) {
            (MaterializedEntity::ChoreTemplate(template), Some(child)) => {
                Some(ChoreAssignment::new(template.id, child.id.clone()))
            }
            _ => None,
        };
        Ok(Materialization { entity, assignment })
    }
}

fn chore_template(
    ctx: &MaterializeContext<'_>,
    payload: &NormalizedPayload,
    category: &str,
    default_icon: &str,
) -> ChoreTemplate {
    ChoreTemplate {
        id: Uuid::new_v4(),
        parent_id: ctx.owner.parent_id.clone(),
        name: payload.text("name").unwrap_or_default().to_string(),
        description: payload.text("description").map(str::to_string),
        point_value: payload.int("pointValue").unwrap_or(1),
        icon: payload.text("icon").unwrap_or(default_icon).to_string(),
        category: category.to_string(),
        source_suggestion_id: Some(ctx.suggestion.id),
        created_at: Utc::now(),
    }
}

fn materialize_task(ctx: &MaterializeContext<'_>, payload: &NormalizedPayload) -> MaterializedEntity {
    let category = payload.text("category").unwrap_or("chores");
    MaterializedEntity::ChoreTemplate(chore_template(ctx, payload, category, "star"))
}

fn materialize_exercise(
    ctx: &MaterializeContext<'_>,
    payload: &NormalizedPayload,
) -> MaterializedEntity {
    MaterializedEntity::ChoreTemplate(chore_template(ctx, payload, "exercise", "dumbbell"))
}

fn materialize_learning_goal(
    ctx: &MaterializeContext<'_>,
    payload: &NormalizedPayload,
) -> MaterializedEntity {
    MaterializedEntity::LearningGoal(LearningGoal {
        id: Uuid::new_v4(),
        child_id: ctx.target_child().id.clone(),
        subject: payload.text("subject").unwrap_or_default().to_string(),
        rationale: payload.text("rationale").map(str::to_string),
        target_units: payload.int("targetUnits").unwrap_or(1),
        points_per_unit: payload.int("pointsPerUnit").unwrap_or(1),
        source_suggestion_id: Some(ctx.suggestion.id),
        created_at: Utc::now(),
    })
}
