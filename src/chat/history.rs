//! Chat history
//!
//! Append-only message log per party on top of `FamilyStore`. Storage order
//! is newest-first; the display order handed to chat windows and the reply
//! generator is oldest-first.

use anyhow::Result;
use std::sync::Arc;

use super::types::{ChatMessage, MessageRole, Party};
use crate::store::FamilyStore;

pub const MAX_HISTORY_LIMIT: usize = 200;

/// Clamp a caller-supplied limit to `1..=MAX_HISTORY_LIMIT`
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_HISTORY_LIMIT)
}

#[derive(Clone)]
pub struct ChatHistory {
    store: Arc<dyn FamilyStore>,
}

impl ChatHistory {
    pub fn new(store: Arc<dyn FamilyStore>) -> Self {
        Self { store }
    }

    /// Durably record a message; returns it with its id and timestamp
    pub async fn append(
        &self,
        party: &Party,
        role: MessageRole,
        message_type: Option<String>,
        content: &str,
    ) -> Result<ChatMessage> {
        let message = ChatMessage::new(party.clone(), role, message_type, content);
        self.store.append_message(&message).await?;
        Ok(message)
    }

    /// Up to `limit` messages, newest first (storage order)
    pub async fn recent_stored(&self, party: &Party, limit: usize) -> Result<Vec<ChatMessage>> {
        self.store.recent_messages(party, clamp_limit(limit)).await
    }

    /// Up to `limit` messages, oldest first (display order)
    pub async fn recent(&self, party: &Party, limit: usize) -> Result<Vec<ChatMessage>> {
        let mut messages = self.recent_stored(party, limit).await?;
        messages.reverse();
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_recent_is_oldest_first_and_bounded() {
        let history = ChatHistory::new(Arc::new(MemoryStore::new()));
        let party = Party::child("c1");
        for i in 0..6 {
            history
                .append(&party, MessageRole::User, None, &format!("m{i}"))
                .await
                .unwrap();
        }

        let display = history.recent(&party, 4).await.unwrap();
        let contents: Vec<_> = display.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4", "m5"]);

        let stored = history.recent_stored(&party, 2).await.unwrap();
        assert_eq!(stored[0].content, "m5");
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(50), 50);
        assert_eq!(clamp_limit(10_000), MAX_HISTORY_LIMIT);

        let history = ChatHistory::new(Arc::new(MemoryStore::new()));
        let party = Party::parent("p1");
        history
            .append(&party, MessageRole::Agent, Some("chat".into()), "hello")
            .await
            .unwrap();
        assert_eq!(history.recent(&party, 0).await.unwrap().len(), 1);
    }
}
