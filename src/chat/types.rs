//! Chat wire types: parties, persisted messages and WebSocket frames

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Party
// ============================================================================

/// Which side of the family a party belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
    Parent,
    Child,
}

impl PartyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartyType::Parent => "parent",
            PartyType::Child => "child",
        }
    }
}

impl fmt::Display for PartyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "parent" => Ok(PartyType::Parent),
            "child" => Ok(PartyType::Child),
            other => Err(format!("Unknown party type: {}", other)),
        }
    }
}

/// Authenticated owner of a chat session or suggestion.
///
/// Routing key for the connection registry and ownership key for history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub party_type: PartyType,
    pub party_id: String,
}

impl Party {
    pub fn new(party_type: PartyType, party_id: impl Into<String>) -> Self {
        Self {
            party_type,
            party_id: party_id.into(),
        }
    }

    pub fn parent(id: impl Into<String>) -> Self {
        Self::new(PartyType::Parent, id)
    }

    pub fn child(id: impl Into<String>) -> Self {
        Self::new(PartyType::Child, id)
    }

    pub fn is_parent(&self) -> bool {
        self.party_type == PartyType::Parent
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.party_type, self.party_id)
    }
}

// ============================================================================
// Persisted messages
// ============================================================================

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Agent,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Agent => "agent",
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "agent" => Ok(MessageRole::Agent),
            other => Err(format!("Unknown message role: {}", other)),
        }
    }
}

/// A chat message as written to the history store. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    #[serde(flatten)]
    pub party: Party,
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        party: Party,
        role: MessageRole,
        message_type: Option<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            party,
            role,
            message_type,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// WebSocket frames
// ============================================================================

/// Frames sent by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Identity declaration; must be the first frame on a connection.
    #[serde(rename_all = "camelCase")]
    Auth {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        party_type: Option<PartyType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        party_id: Option<String>,
        /// Legacy child-only form
        #[serde(default, skip_serializing_if = "Option::is_none")]
        child_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        message: String,
        /// Redundant on the legacy child client, ignored
        #[serde(default, skip_serializing_if = "Option::is_none")]
        child_id: Option<String>,
    },
}

impl ClientFrame {
    /// Auth frame in the party form
    pub fn auth(party: &Party, token: Option<String>) -> Self {
        ClientFrame::Auth {
            party_type: Some(party.party_type),
            party_id: Some(party.party_id.clone()),
            child_id: None,
            token,
        }
    }

    pub fn chat(message: impl Into<String>) -> Self {
        ClientFrame::Chat {
            message: message.into(),
            child_id: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    AgentMessage {
        content: String,
        timestamp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_type: Option<String>,
    },
    Error { content: String },
}

impl ServerFrame {
    pub fn error(content: impl Into<String>) -> Self {
        ServerFrame::Error {
            content: content.into(),
        }
    }

    pub fn agent_message(message: &ChatMessage) -> Self {
        ServerFrame::AgentMessage {
            content: message.content.clone(),
            timestamp: message.created_at.to_rfc3339(),
            message_type: message.message_type.clone(),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a plain enum of strings cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}
