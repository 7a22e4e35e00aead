//! Real-time chat
//!
//! - `types`: parties, stored messages and WebSocket frames
//! - `registry`: live connections keyed by party
//! - `handshake`: per-connection auth state machine
//! - `history`: append-only message log
//! - `router`: one chat turn, from user message to delivered reply

pub mod handshake;
pub mod history;
pub mod registry;
pub mod router;
pub mod types;

pub use handshake::{check_auth_frame, AuthAttempt, ConnectionSession, FrameAction};
pub use history::ChatHistory;
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use router::{ChatRouter, TurnOutcome};
pub use types::{ChatMessage, ClientFrame, MessageRole, Party, PartyType, ServerFrame};
