//! Authentication module
//!
//! Provides:
//! - JWT encoding/decoding with party claims (`jwt`)
//! - `PartyVerifier`: the identity check run by the WebSocket handshake (`verifier`)
//! - `require_auth` middleware for REST routes (`middleware`)
//! - `Caller` extractor with ownership checks (`extractor`)

pub mod extractor;
pub mod jwt;
pub mod middleware;
pub mod verifier;

pub use verifier::PartyVerifier;
