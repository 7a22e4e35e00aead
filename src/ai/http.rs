//! HTTP AI provider
//!
//! Talks to any OpenAI-compatible `/v1/chat/completions` endpoint
//! (OpenAI, Ollama, LiteLLM, vLLM). Configured through the `ai` section of
//! `config.yaml` or `AI_URL` / `AI_MODEL` / `AI_API_KEY`.

use super::traits::{AgentReply, ReplyGenerator, SuggestionGenerator};
use crate::chat::types::{ChatMessage, MessageRole, Party, PartyType};
use crate::store::models::ChildProfile;
use crate::suggestions::models::{GenerateParams, SuggestionKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// HTTP-based provider using the OpenAI chat completions format.
///
/// Cheaply cloneable (shares the reqwest client internally).
#[derive(Clone)]
pub struct HttpAiProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<PromptMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct PromptMessage {
    role: &'static str,
    content: String,
}

impl PromptMessage {
    fn new(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// OpenAI-compatible error response
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpAiProvider {
    pub fn new(url: String, model: String, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url,
            model,
            api_key,
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Send one completion request and return the first choice's text.
    async fn complete(&self, messages: Vec<PromptMessage>, temperature: f32) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
        };

        let mut req = self.client.post(&self.url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to connect to AI API at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                if let Some(detail) = err.error {
                    anyhow::bail!("AI API error ({}): {}", status.as_u16(), detail.message);
                }
            }
            anyhow::bail!("AI API returned {}: {}", status.as_u16(), body);
        }

        let resp: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse AI API response")?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .context("AI API returned an empty completion")?;

        Ok(content)
    }
}

fn reply_system_prompt(party: &Party) -> String {
    match party.party_type {
        PartyType::Child => "You are Quest Buddy, a cheerful helper for a child using a family \
            chore app. Keep answers short, kind and age-appropriate. Encourage finishing chores \
            and learning goals."
            .to_string(),
        PartyType::Parent => "You are the assistant of a family chore app. Help the parent plan \
            chores, rewards and learning goals for their children. Be concise and practical."
            .to_string(),
    }
}

fn suggestion_prompt(kind: SuggestionKind, child: &ChildProfile, params: &GenerateParams) -> String {
    let shape = match kind {
        SuggestionKind::Task => {
            r#"{"name": string, "description": string, "pointValue": integer, "icon": string, "category": string, "difficulty": string, "estimatedTime": string}"#
        }
        SuggestionKind::Exercise => {
            r#"{"name": string, "description": string, "pointValue": integer, "icon": string, "difficulty": string, "estimatedTime": string}"#
        }
        SuggestionKind::LearningGoal => {
            r#"{"subject": string, "rationale": string, "suggestedTargetUnits": integer, "pointsPerUnit": integer}"#
        }
    };
    let age = child
        .age
        .map(|a| format!(" aged {}", a))
        .unwrap_or_default();
    let extra = if params.extra.is_empty() {
        String::new()
    } else {
        format!(
            "\nAdditional preferences: {}",
            serde_json::Value::Object(params.extra.clone())
        )
    };

    format!(
        "Suggest {count} {kind} ideas for a child named {name}{age}.{extra}\n\
         Answer with a JSON array only. Each element must have this shape: {shape}",
        count = params.effective_count(),
        kind = kind.as_str().replace('_', " "),
        name = child.name,
    )
}

/// Extract a JSON array of candidates from model output.
///
/// Accepts a bare array, an array inside a Markdown code fence, an object
/// wrapping the array under `suggestions`, or an array embedded in prose.
pub(crate) fn parse_candidates(text: &str) -> Result<Vec<serde_json::Value>> {
    let trimmed = strip_code_fence(text.trim());

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        match value {
            serde_json::Value::Array(items) => return Ok(items),
            serde_json::Value::Object(mut obj) => {
                if let Some(serde_json::Value::Array(items)) = obj.remove("suggestions") {
                    return Ok(items);
                }
            }
            _ => {}
        }
    }

    let start = trimmed.find('[').context("AI output contains no JSON array")?;
    let end = trimmed.rfind(']').context("AI output contains no JSON array")?;
    if end < start {
        anyhow::bail!("AI output contains no JSON array");
    }
    serde_json::from_str(&trimmed[start..=end]).context("AI output is not a valid JSON array")
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[async_trait]
impl ReplyGenerator for HttpAiProvider {
    async fn generate_reply(
        &self,
        party: &Party,
        history: &[ChatMessage],
        text: &str,
    ) -> Result<AgentReply> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(PromptMessage::new("system", reply_system_prompt(party)));
        for msg in history {
            let role = match msg.role {
                MessageRole::User => "user",
                MessageRole::Agent => "assistant",
            };
            messages.push(PromptMessage::new(role, msg.content.clone()));
        }
        messages.push(PromptMessage::new("user", text));

        debug!(party = %party, turns = messages.len(), "Requesting chat reply");
        let content = self.complete(messages, 0.7).await?;
        Ok(AgentReply::chat(content.trim()))
    }
}

#[async_trait]
impl SuggestionGenerator for HttpAiProvider {
    async fn generate_candidates(
        &self,
        kind: SuggestionKind,
        child: &ChildProfile,
        params: &GenerateParams,
    ) -> Result<Vec<serde_json::Value>> {
        let messages = vec![
            PromptMessage::new(
                "system",
                "You generate structured suggestions for a family chore app. Output JSON only.",
            ),
            PromptMessage::new("user", suggestion_prompt(kind, child, params)),
        ];

        debug!(kind = %kind, child_id = %child.id, "Requesting suggestion candidates");
        let content = self.complete(messages, 0.9).await?;
        parse_candidates(&content)
    }
}
