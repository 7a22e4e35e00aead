//! Mock AI provider for tests and offline demos
//!
//! Deterministic behaviour:
//! - replies echo the user text (`Echo: <text>`) unless a fixed reply is set
//! - candidates are scripted per kind
//! - either seam can be switched to fail at runtime
//! - call counters let tests assert what was (not) invoked

use super::traits::{AgentReply, ReplyGenerator, SuggestionGenerator};
use crate::chat::types::{ChatMessage, Party};
use crate::store::models::ChildProfile;
use crate::suggestions::models::{GenerateParams, SuggestionKind};
use anyhow::{bail, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted AI provider. Not gated on `cfg(test)` so integration tests and
/// `ai.provider: mock` can use it.
#[derive(Default)]
pub struct MockAiProvider {
    fixed_reply: Option<AgentReply>,
    reply_delay: Option<fn(&str) -> Duration>,
    candidates: DashMap<SuggestionKind, Vec<serde_json::Value>>,
    fail_replies: AtomicBool,
    fail_generation: AtomicBool,
    reply_calls: AtomicUsize,
    generate_calls: AtomicUsize,
}

impl MockAiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `reply` instead of echoing
    pub fn with_reply(mut self, reply: AgentReply) -> Self {
        self.fixed_reply = Some(reply);
        self
    }

    /// Sleep for `delay(text)` before replying
    pub fn with_reply_delay(mut self, delay: fn(&str) -> Duration) -> Self {
        self.reply_delay = Some(delay);
        self
    }

    pub fn with_candidates(self, kind: SuggestionKind, candidates: Vec<serde_json::Value>) -> Self {
        self.set_candidates(kind, candidates);
        self
    }

    pub fn set_candidates(&self, kind: SuggestionKind, candidates: Vec<serde_json::Value>) {
        self.candidates.insert(kind, candidates);
    }

    pub fn set_fail_replies(&self, fail: bool) {
        self.fail_replies.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_generation(&self, fail: bool) {
        self.fail_generation.store(fail, Ordering::SeqCst);
    }

    pub fn reply_calls(&self) -> usize {
        self.reply_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplyGenerator for MockAiProvider {
    async fn generate_reply(
        &self,
        _party: &Party,
        _history: &[ChatMessage],
        text: &str,
    ) -> Result<AgentReply> {
        self.reply_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.reply_delay {
            tokio::time::sleep(delay(text)).await;
        }
        if self.fail_replies.load(Ordering::SeqCst) {
            bail!("mock reply generator failure");
        }
        Ok(self
            .fixed_reply
            .clone()
            .unwrap_or_else(|| AgentReply::chat(format!("Echo: {}", text))))
    }
}

#[async_trait]
impl SuggestionGenerator for MockAiProvider {
    async fn generate_candidates(
        &self,
        kind: SuggestionKind,
        _child: &ChildProfile,
        _params: &GenerateParams,
    ) -> Result<Vec<serde_json::Value>> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generation.load(Ordering::SeqCst) {
            bail!("mock suggestion generator failure");
        }
        Ok(self
            .candidates
            .get(&kind)
            .map(|c| c.value().clone())
            .unwrap_or_default())
    }
}
