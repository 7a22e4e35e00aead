//! Message router
//!
//! Handles one `chat` turn for an authenticated party: persist the user
//! message, ask the reply generator, persist the reply and fan it out to the
//! party's live connections. Failures are reported to the originating
//! connection only.

use std::sync::Arc;
use tracing::{debug, error, warn};

use super::history::ChatHistory;
use super::registry::{ConnectionHandle, ConnectionRegistry};
use super::types::{MessageRole, Party, ServerFrame};
use crate::ai::ReplyGenerator;

/// How a chat turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Reply persisted and delivered to this many connections
    Replied(usize),
    /// Rejected before anything was stored
    Rejected,
    /// User message could not be stored
    StoreFailed,
    /// Reply generation failed; user message stays stored
    GeneratorFailed,
}

pub struct ChatRouter {
    registry: Arc<ConnectionRegistry>,
    history: ChatHistory,
    replies: Arc<dyn ReplyGenerator>,
    context_limit: usize,
}

impl ChatRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        history: ChatHistory,
        replies: Arc<dyn ReplyGenerator>,
        context_limit: usize,
    ) -> Self {
        Self {
            registry,
            history,
            replies,
            context_limit,
        }
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub async fn handle_chat(&self, origin: ConnectionHandle, party: &Party, text: &str) -> TurnOutcome {
        let text = text.trim();
        if text.is_empty() {
            self.registry
                .send_to(origin, ServerFrame::error("Message must not be empty"));
            return TurnOutcome::Rejected;
        }

        let user_message = match self
            .history
            .append(party, MessageRole::User, Some("chat".to_string()), text)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                error!(%party, error = %e, "Failed to persist chat message");
                self.registry.send_to(
                    origin,
                    ServerFrame::error("Your message could not be saved, please try again"),
                );
                return TurnOutcome::StoreFailed;
            }
        };

        // Context excludes the message being answered
        let context = match self.history.recent(party, self.context_limit + 1).await {
            Ok(mut messages) => {
                messages.retain(|m| m.id != user_message.id);
                messages
            }
            Err(e) => {
                warn!(%party, error = %e, "Failed to load chat context, replying without it");
                Vec::new()
            }
        };

        let reply = match self.replies.generate_reply(party, &context, text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(%party, error = %e, "Reply generation failed");
                self.registry.send_to(
                    origin,
                    ServerFrame::error("The assistant is unavailable right now, please try again"),
                );
                return TurnOutcome::GeneratorFailed;
            }
        };

        let agent_message = match self
            .history
            .append(party, MessageRole::Agent, reply.message_type, &reply.content)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                error!(%party, error = %e, "Failed to persist agent reply");
                self.registry.send_to(
                    origin,
                    ServerFrame::error("The reply could not be saved, please try again"),
                );
                return TurnOutcome::StoreFailed;
            }
        };

        let delivered = self
            .registry
            .send(party, &ServerFrame::agent_message(&agent_message));
        debug!(%party, delivered, "Agent reply delivered");
        TurnOutcome::Replied(delivered)
    }
}
