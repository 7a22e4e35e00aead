//! AI collaborator traits
//!
//! Both traits are async + Send + Sync so they can be shared as
//! `Arc<dyn ReplyGenerator>` / `Arc<dyn SuggestionGenerator>`.

use crate::chat::types::{ChatMessage, Party};
use crate::store::models::ChildProfile;
use crate::suggestions::models::{GenerateParams, SuggestionKind};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The agent's answer to one chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub content: String,
    /// Category tag shown by the client (e.g. `chat`, `encouragement`)
    #[serde(default)]
    pub message_type: Option<String>,
}

impl AgentReply {
    pub fn chat(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: Some("chat".to_string()),
        }
    }
}

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Generate the agent reply to `text`.
    ///
    /// `history` holds the party's earlier messages, oldest first, and does
    /// not include `text` itself.
    ///
    /// # Errors
    ///
    /// Any failure (network, API error, unparseable output) is returned as-is;
    /// the router turns it into an `error` frame.
    async fn generate_reply(
        &self,
        party: &Party,
        history: &[ChatMessage],
        text: &str,
    ) -> Result<AgentReply>;
}

#[async_trait]
pub trait SuggestionGenerator: Send + Sync {
    /// Generate raw candidate payloads of `kind` for `child`.
    ///
    /// Candidates are not validated here; the engine normalizes each one and
    /// skips those that do not fit the kind's schema.
    async fn generate_candidates(
        &self,
        kind: SuggestionKind,
        child: &ChildProfile,
        params: &GenerateParams,
    ) -> Result<Vec<serde_json::Value>>;
}
