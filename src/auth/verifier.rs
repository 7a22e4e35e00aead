//! Identity verification for declared parties

use super::jwt::decode_jwt;
use crate::chat::types::Party;
use tracing::debug;

/// Decides whether a party declared in an `auth` frame is genuine.
#[derive(Debug, Clone)]
pub enum PartyVerifier {
    /// Trust the declared identity (no `auth.jwt_secret` configured)
    Open,
    /// Require a JWT whose claims name exactly the declared party
    Jwt { secret: String },
}

impl PartyVerifier {
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret.filter(|s| !s.is_empty()) {
            Some(secret) => PartyVerifier::Jwt {
                secret: secret.to_string(),
            },
            None => PartyVerifier::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, PartyVerifier::Open)
    }

    pub fn verify(&self, declared: &Party, token: Option<&str>) -> Result<(), String> {
        match self {
            PartyVerifier::Open => Ok(()),
            PartyVerifier::Jwt { secret } => {
                let token = token.ok_or_else(|| "Authentication token required".to_string())?;
                let claims = decode_jwt(token, secret).map_err(|e| {
                    debug!(party = %declared, error = %e, "Handshake token rejected");
                    "Invalid authentication token".to_string()
                })?;
                if claims.party() != *declared {
                    return Err("Token does not match the declared party".to_string());
                }
                Ok(())
            }
        }
    }
}
