//! AI collaborator
//!
//! Two seams:
//! - `ReplyGenerator`: produces the agent's chat reply for a party
//! - `SuggestionGenerator`: produces raw candidate payloads for a suggestion kind
//!
//! Implementations:
//! - `HttpAiProvider`: any OpenAI-compatible `/v1/chat/completions` endpoint
//! - `MockAiProvider`: scripted, deterministic, no network
//! - `DisabledAiProvider`: fails every call, used when no AI endpoint is configured

mod http;
mod mock;
mod traits;

pub use http::HttpAiProvider;
pub use mock::MockAiProvider;
pub use traits::{AgentReply, ReplyGenerator, SuggestionGenerator};

use crate::chat::types::{ChatMessage, Party};
use crate::store::models::ChildProfile;
use crate::suggestions::models::{GenerateParams, SuggestionKind};
use anyhow::{bail, Result};
use async_trait::async_trait;

/// Provider used when `ai.url` is empty or `disabled`
#[derive(Debug, Clone, Default)]
pub struct DisabledAiProvider;

#[async_trait]
impl ReplyGenerator for DisabledAiProvider {
    async fn generate_reply(
        &self,
        _party: &Party,
        _history: &[ChatMessage],
        _text: &str,
    ) -> Result<AgentReply> {
        bail!("AI provider is not configured")
    }
}

#[async_trait]
impl SuggestionGenerator for DisabledAiProvider {
    async fn generate_candidates(
        &self,
        _kind: SuggestionKind,
        _child: &ChildProfile,
        _params: &GenerateParams,
    ) -> Result<Vec<serde_json::Value>> {
        bail!("AI provider is not configured")
    }
}
