//! Caller extractor for Axum handlers.
//!
//! Reads the caller's party from request extensions (populated by the
//! `require_auth` middleware) and answers ownership questions.

use crate::api::handlers::{AppError, SharedState};
use crate::auth::jwt::Claims;
use crate::chat::types::{Party, PartyType};
use crate::store::models::ChildProfile;
use crate::store::FamilyStore;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// The party behind a request.
///
/// `None` in open mode: every check passes.
///
/// ```rust,ignore
/// async fn my_handler(caller: Caller) -> Result<(), AppError> {
///     caller.ensure_party(&Party::child("c1"))
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Option<Party>);

impl Caller {
    pub fn party(&self) -> Option<&Party> {
        self.0.as_ref()
    }

    /// Allow acting as exactly `party`
    pub fn ensure_party(&self, party: &Party) -> Result<(), AppError> {
        match &self.0 {
            None => Ok(()),
            Some(caller) if caller == party => Ok(()),
            Some(caller) => Err(AppError::Forbidden(format!(
                "{} may not act as {}",
                caller, party
            ))),
        }
    }

    /// Allow acting on a parent id: only that parent
    pub fn ensure_parent(&self, parent_id: &str) -> Result<(), AppError> {
        self.ensure_party(&Party::parent(parent_id))
    }

    /// Allow acting on a child: the child itself or its parent.
    ///
    /// Returns the child profile when it exists; in open mode a missing
    /// child is not an error here (`None`), callers decide.
    pub async fn ensure_child_access(
        &self,
        store: &dyn FamilyStore,
        child_id: &str,
    ) -> Result<Option<ChildProfile>, AppError> {
        let child = store.get_child(child_id).await?;
        let Some(caller) = &self.0 else {
            return Ok(child);
        };

        let allowed = match caller.party_type {
            PartyType::Child => caller.party_id == child_id,
            PartyType::Parent => child
                .as_ref()
                .is_some_and(|c| c.parent_id == caller.party_id),
        };
        if !allowed {
            return Err(AppError::Forbidden(format!(
                "{} may not access child {}",
                caller, child_id
            )));
        }
        Ok(child)
    }

    /// Allow reading a party's chat history: the party itself, or a parent
    /// reading one of their children
    pub async fn ensure_history_access(
        &self,
        store: &dyn FamilyStore,
        party: &Party,
    ) -> Result<(), AppError> {
        match (&self.0, party.party_type) {
            (None, _) => Ok(()),
            (Some(caller), _) if caller == party => Ok(()),
            (Some(caller), PartyType::Child) if caller.is_parent() => self
                .ensure_child_access(store, &party.party_id)
                .await
                .map(|_| ()),
            (Some(caller), _) => Err(AppError::Forbidden(format!(
                "{} may not read history of {}",
                caller, party
            ))),
        }
    }
}

impl FromRequestParts<SharedState> for Caller {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let open = state.verifier.is_open();
        let claims = parts.extensions.get::<Claims>().cloned();
        async move {
            match (open, claims) {
                (true, _) => Ok(Caller(None)),
                (false, Some(claims)) => Ok(Caller(Some(claims.party()))),
                (false, None) => Err(AppError::Unauthorized(
                    "Authentication required, no claims in request".to_string(),
                )),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
