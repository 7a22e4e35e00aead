//! Per-connection authentication handshake
//!
//! `Unauthenticated → Authenticated(party)`, terminal. The first accepted
//! `auth` frame binds the connection in the registry. Until then every other
//! frame is dropped without a response, so unauthenticated senders learn
//! nothing. No timeout applies to the unauthenticated state.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::registry::{ConnectionHandle, ConnectionRegistry};
use super::types::{ClientFrame, Party, PartyType, ServerFrame};
use crate::auth::PartyVerifier;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Unauthenticated,
    Authenticated(Party),
}

/// What the connection handler should do with an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameAction {
    /// Nothing to do (dropped frame, repeated auth)
    Ignore,
    /// Handshake completed; the connection is now bound to this party
    Authenticated(Party),
    /// Send this frame back to the originating connection only
    Reply(ServerFrame),
    /// Forward to the message router
    Chat { party: Party, message: String },
}

pub struct ConnectionSession {
    handle: ConnectionHandle,
    registry: Arc<ConnectionRegistry>,
    verifier: PartyVerifier,
    state: SessionState,
}

impl ConnectionSession {
    pub fn new(
        handle: ConnectionHandle,
        registry: Arc<ConnectionRegistry>,
        verifier: PartyVerifier,
    ) -> Self {
        Self {
            handle,
            registry,
            verifier,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle
    }

    pub fn party(&self) -> Option<&Party> {
        match &self.state {
            SessionState::Authenticated(party) => Some(party),
            SessionState::Unauthenticated => None,
        }
    }

    /// Process one inbound text frame
    pub fn on_text(&mut self, text: &str) -> FrameAction {
        let Some(party) = self.party().cloned() else {
            return match check_auth_frame(text, &self.verifier) {
                AuthAttempt::NotAuth => {
                    debug!(handle = %self.handle, "Dropping frame before handshake");
                    FrameAction::Ignore
                }
                AuthAttempt::Rejected(reason) => {
                    warn!(handle = %self.handle, %reason, "Handshake rejected");
                    FrameAction::Reply(ServerFrame::error(reason))
                }
                AuthAttempt::Accepted(declared) => self.bind(declared),
            };
        };

        match serde_json::from_str::<ClientFrame>(text) {
            Ok(ClientFrame::Chat { message, .. }) => FrameAction::Chat { party, message },
            Ok(ClientFrame::Auth { .. }) => {
                debug!(handle = %self.handle, %party, "Ignoring repeated auth frame");
                FrameAction::Ignore
            }
            Err(e) => FrameAction::Reply(ServerFrame::error(format!("Invalid message: {}", e))),
        }
    }

    fn bind(&mut self, declared: Party) -> FrameAction {
        if !self.registry.bind(self.handle, declared.clone()) {
            // Handle vanished (socket already closing)
            return FrameAction::Ignore;
        }
        info!(handle = %self.handle, party = %declared, "Connection authenticated");
        self.state = SessionState::Authenticated(declared.clone());
        FrameAction::Authenticated(declared)
    }
}

/// Result of inspecting a frame received before the handshake completed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthAttempt {
    /// Not an `auth` frame (or not JSON at all); drop it silently
    NotAuth,
    /// An `auth` frame that failed validation or verification
    Rejected(String),
    Accepted(Party),
}

/// Validate an `auth` frame and verify the declared identity.
///
/// Accepts `{partyType, partyId}` and the legacy child form `{childId}`.
/// A frame tagged `auth` whose fields do not parse is rejected, not dropped.
pub fn check_auth_frame(text: &str, verifier: &PartyVerifier) -> AuthAttempt {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return AuthAttempt::NotAuth;
    };
    if value.get("type").and_then(Value::as_str) != Some("auth") {
        return AuthAttempt::NotAuth;
    }
    let (party_type, party_id, child_id, token) = match serde_json::from_value(value) {
        Ok(ClientFrame::Auth {
            party_type,
            party_id,
            child_id,
            token,
        }) => (party_type, party_id, child_id, token),
        Ok(_) => return AuthAttempt::NotAuth,
        Err(e) => return AuthAttempt::Rejected(format!("Invalid auth frame: {}", e)),
    };

    let declared = match (party_type, party_id, child_id) {
        (Some(party_type), Some(id), _) => Party::new(party_type, id.trim()),
        (None, None, Some(id)) | (Some(PartyType::Child), None, Some(id)) => Party::child(id.trim()),
        (None, Some(_), _) => return AuthAttempt::Rejected("partyType is required".to_string()),
        _ => return AuthAttempt::Rejected("partyId is required".to_string()),
    };
    if declared.party_id.is_empty() {
        return AuthAttempt::Rejected("partyId is required".to_string());
    }

    match verifier.verify(&declared, token.as_deref()) {
        Ok(()) => AuthAttempt::Accepted(declared),
        Err(reason) => AuthAttempt::Rejected(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::encode_jwt;
    use tokio::sync::mpsc;

    fn session(verifier: PartyVerifier) -> (ConnectionSession, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = registry.register(tx);
        (
            ConnectionSession::new(handle, registry.clone(), verifier),
            registry,
        )
    }

    #[test]
    fn test_chat_before_auth_is_dropped() {
        let (mut s, registry) = session(PartyVerifier::Open);
        assert_eq!(s.on_text(r#"{"type":"chat","message":"hi"}"#), FrameAction::Ignore);
        assert_eq!(s.on_text("not json"), FrameAction::Ignore);
        assert!(s.party().is_none());
        assert_eq!(registry.party_of(s.handle()), None);
    }

    #[test]
    fn test_auth_binds_and_forwards_chat() {
        let (mut s, registry) = session(PartyVerifier::Open);
        let action = s.on_text(r#"{"type":"auth","partyType":"parent","partyId":"p1"}"#);
        assert_eq!(action, FrameAction::Authenticated(Party::parent("p1")));
        assert_eq!(registry.party_of(s.handle()), Some(Party::parent("p1")));

        assert_eq!(
            s.on_text(r#"{"type":"chat","message":"hello"}"#),
            FrameAction::Chat {
                party: Party::parent("p1"),
                message: "hello".into()
            }
        );
    }

    #[test]
    fn test_legacy_child_auth() {
        let (mut s, _) = session(PartyVerifier::Open);
        let action = s.on_text(r#"{"type":"auth","childId":"c7"}"#);
        assert_eq!(action, FrameAction::Authenticated(Party::child("c7")));
        assert!(matches!(
            s.on_text(r#"{"type":"chat","message":"hi","childId":"c7"}"#),
            FrameAction::Chat { .. }
        ));
    }

    #[test]
    fn test_blank_party_id_rejected() {
        let (mut s, _) = session(PartyVerifier::Open);
        let action = s.on_text(r#"{"type":"auth","partyType":"child","partyId":"  "}"#);
        assert_eq!(
            action,
            FrameAction::Reply(ServerFrame::error("partyId is required"))
        );
        assert!(s.party().is_none());

        // Still possible to authenticate afterwards
        assert!(matches!(
            s.on_text(r#"{"type":"auth","partyType":"child","partyId":"c1"}"#),
            FrameAction::Authenticated(_)
        ));
    }

    #[test]
    fn test_no_re_handshake() {
        let (mut s, registry) = session(PartyVerifier::Open);
        s.on_text(r#"{"type":"auth","partyType":"child","partyId":"c1"}"#);
        assert_eq!(
            s.on_text(r#"{"type":"auth","partyType":"child","partyId":"c2"}"#),
            FrameAction::Ignore
        );
        assert_eq!(s.party(), Some(&Party::child("c1")));
        assert_eq!(registry.party_connection_count(&Party::child("c2")), 0);
    }

    #[test]
    fn test_garbage_after_auth_gets_error() {
        let (mut s, _) = session(PartyVerifier::Open);
        s.on_text(r#"{"type":"auth","childId":"c1"}"#);
        assert!(matches!(s.on_text("{oops"), FrameAction::Reply(ServerFrame::Error { .. })));
    }

    #[test]
    fn test_jwt_handshake() {
        let secret = "test-secret-key-minimum-32-chars!!";
        let (mut s, _) = session(PartyVerifier::from_secret(Some(secret)));

        assert!(matches!(
            s.on_text(r#"{"type":"auth","partyType":"child","partyId":"c1"}"#),
            FrameAction::Reply(_)
        ));

        let token = encode_jwt(&Party::child("c1"), "Mia", secret, 60).unwrap();
        let frame = serde_json::json!({
            "type": "auth", "partyType": "child", "partyId": "c1", "token": token
        });
        assert_eq!(
            s.on_text(&frame.to_string()),
            FrameAction::Authenticated(Party::child("c1"))
        );
    }

    #[test]
    fn test_check_auth_frame_without_session() {
        let verifier = PartyVerifier::Open;
        assert_eq!(
            check_auth_frame(r#"{"type":"chat","message":"hi"}"#, &verifier),
            AuthAttempt::NotAuth
        );
        assert_eq!(
            check_auth_frame(r#"{"type":"auth","partyId":"p1"}"#, &verifier),
            AuthAttempt::Rejected("partyType is required".into())
        );
        assert_eq!(
            check_auth_frame(r#"{"type":"auth","partyType":"parent"}"#, &verifier),
            AuthAttempt::Rejected("partyId is required".into())
        );
        assert_eq!(
            check_auth_frame(r#"{"type":"auth","partyType":"parent","partyId":" p1 "}"#, &verifier),
            AuthAttempt::Accepted(Party::parent("p1"))
        );
    }

    #[test]
    fn test_malformed_auth_frame_is_rejected() {
        let verifier = PartyVerifier::Open;
        let attempt = check_auth_frame(
            r#"{"type":"auth","partyType":"PARENT","partyId":"p1"}"#,
            &verifier,
        );
        assert!(
            matches!(&attempt, AuthAttempt::Rejected(reason) if reason.starts_with("Invalid auth frame")),
            "got {:?}",
            attempt
        );
        assert!(matches!(
            check_auth_frame(r#"{"type":"auth","partyId":42}"#, &verifier),
            AuthAttempt::Rejected(_)
        ));

        // The session replies with an error and stays unauthenticated
        let (mut s, _) = session(verifier);
        assert!(matches!(
            s.on_text(r#"{"type":"auth","partyType":"grandparent","partyId":"g1"}"#),
            FrameAction::Reply(ServerFrame::Error { .. })
        ));
        assert!(s.party().is_none());
    }
}
