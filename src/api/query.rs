//! Query parameter structs for list endpoints

use serde::{Deserialize, Deserializer};
use std::str::FromStr;

use super::handlers::AppError;
use crate::chat::types::{Party, PartyType};
use crate::suggestions::models::{SuggestionKind, SuggestionStatus};

/// Helper to deserialize optional values from query string (which are always strings)
fn deserialize_option_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.trim().is_empty() => s.trim().parse().map(Some).map_err(D::Error::custom),
        _ => Ok(None),
    }
}

/// `GET /api/app-chat/history?partyType&partyId&limit`
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub party_type: Option<PartyType>,
    pub party_id: Option<String>,
    /// Legacy child-only form
    pub child_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub limit: Option<usize>,
}

impl HistoryQuery {
    /// Resolve the party whose history is requested
    pub fn party(&self) -> Result<Party, AppError> {
        let party_id = self
            .party_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());
        let child_id = self
            .child_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        match (self.party_type, party_id, child_id) {
            (Some(party_type), Some(id), _) => Ok(Party::new(party_type, id)),
            (None | Some(PartyType::Child), None, Some(id)) => Ok(Party::child(id)),
            (None, Some(_), _) => Err(AppError::BadRequest("partyType is required".to_string())),
            _ => Err(AppError::BadRequest("partyId is required".to_string())),
        }
    }
}

/// `GET /api/ai/suggestions?childId&status&kind`
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionListQuery {
    pub child_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub status: Option<SuggestionStatus>,
    #[serde(default, deserialize_with = "deserialize_option_from_str")]
    pub kind: Option<SuggestionKind>,
}

impl SuggestionListQuery {
    pub fn child_id(&self) -> Result<&str, AppError> {
        self.child_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest("childId is required".to_string()))
    }
}
