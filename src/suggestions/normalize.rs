//! Per-kind payload normalization
//!
//! Generator output names the same field differently depending on kind and
//! generator version (`subject` vs `name`, `pointsReward` vs `pointValue`).
//! Each kind has one table mapping canonical fields to their aliases, in
//! priority order. The same table validates candidates at generation time
//! and feeds the materializer at acceptance time.

use serde_json::{Map, Value};

use super::models::SuggestionKind;

/// Value shape a canonical field must resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Text,
    PositiveInt,
}

/// One canonical field and the payload keys it may arrive under
struct FieldRule {
    canonical: &'static str,
    aliases: &'static [&'static str],
    field_type: FieldType,
    required: bool,
}

const fn rule(
    canonical: &'static str,
    aliases: &'static [&'static str],
    field_type: FieldType,
    required: bool,
) -> FieldRule {
    FieldRule {
        canonical,
        aliases,
        field_type,
        required,
    }
}

const TASK_FIELDS: &[FieldRule] = &[
    rule("name", &["name", "title", "subject"], FieldType::Text, true),
    rule("pointValue", &["pointValue", "pointsReward", "points"], FieldType::PositiveInt, true),
    rule("description", &["description", "rationale", "details"], FieldType::Text, false),
    rule("icon", &["icon", "emoji"], FieldType::Text, false),
    rule("category", &["category"], FieldType::Text, false),
    rule("difficulty", &["difficulty"], FieldType::Text, false),
    rule("estimatedTime", &["estimatedTime", "estimatedMinutes"], FieldType::Text, false),
];

const EXERCISE_FIELDS: &[FieldRule] = &[
    rule("name", &["name", "title", "subject", "activity"], FieldType::Text, true),
    rule("pointValue", &["pointValue", "pointsReward", "points"], FieldType::PositiveInt, true),
    rule("description", &["description", "rationale", "details"], FieldType::Text, false),
    rule("icon", &["icon", "emoji"], FieldType::Text, false),
    rule("difficulty", &["difficulty"], FieldType::Text, false),
    rule("estimatedTime", &["estimatedTime", "estimatedMinutes"], FieldType::Text, false),
];

const LEARNING_GOAL_FIELDS: &[FieldRule] = &[
    rule("subject", &["subject", "title", "name"], FieldType::Text, true),
    rule("targetUnits", &["suggestedTargetUnits", "targetUnits"], FieldType::PositiveInt, true),
    rule("pointsPerUnit", &["pointsPerUnit", "pointsReward"], FieldType::PositiveInt, false),
    rule("rationale", &["rationale", "description"], FieldType::Text, false),
];

fn rules_for(kind: SuggestionKind) -> &'static [FieldRule] {
    match kind {
        SuggestionKind::Task => TASK_FIELDS,
        SuggestionKind::Exercise => EXERCISE_FIELDS,
        SuggestionKind::LearningGoal => LEARNING_GOAL_FIELDS,
    }
}

/// Why a payload does not satisfy its kind's schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("missing required field '{0}'")]
    Missing(&'static str),
    #[error("field '{field}' has an invalid value: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// A payload rewritten under canonical field names
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    fields: Map<String, Value>,
}

impl NormalizedPayload {
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.fields.get(field).and_then(Value::as_i64)
    }
}

/// Map a raw payload onto the kind's canonical fields.
///
/// The first alias present with a usable value wins. A present but unusable
/// optional field is dropped; a missing or unusable required field fails.
pub fn normalize(kind: SuggestionKind, payload: &Value) -> Result<NormalizedPayload, NormalizeError> {
    let raw = payload.as_object().ok_or(NormalizeError::NotAnObject)?;
    let mut fields = Map::new();

    for rule in rules_for(kind) {
        let mut rejection = None;
        let mut resolved = None;
        for alias in rule.aliases {
            let Some(value) = raw.get(*alias) else { continue };
            if value.is_null() {
                continue;
            }
            match coerce(rule.field_type, value) {
                Ok(v) => {
                    resolved = Some(v);
                    break;
                }
                Err(reason) => {
                    rejection.get_or_insert(reason);
                }
            }
        }

        match (resolved, rule.required) {
            (Some(value), _) => {
                fields.insert(rule.canonical.to_string(), value);
            }
            (None, true) => {
                return Err(match rejection {
                    Some(reason) => NormalizeError::Invalid {
                        field: rule.canonical,
                        reason,
                    },
                    None => NormalizeError::Missing(rule.canonical),
                })
            }
            (None, false) => {}
        }
    }

    Ok(NormalizedPayload { fields })
}

fn coerce(field_type: FieldType, value: &Value) -> Result<Value, &'static str> {
    match field_type {
        FieldType::Text => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(Value::String(s.trim().to_string())),
            Value::String(_) => Err("must not be blank"),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            _ => Err("must be a string"),
        },
        FieldType::PositiveInt => {
            let n = as_integer(value).ok_or("must be an integer")?;
            if n <= 0 {
                return Err("must be positive");
            }
            Ok(Value::from(n))
        }
    }
}

/// Integers, integral floats and numeric strings are all accepted
fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && f.is_finite() && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}
