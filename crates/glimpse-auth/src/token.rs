//! Bearer-token validation at session admission.

use std::collections::HashMap;

use async_trait::async_trait;
use glimpse_core::Identity;
use thiserror::Error;

/// Token validation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Token is unknown, malformed, or expired.
    #[error("invalid or expired token")]
    InvalidToken,
    /// The validating backend failed.
    #[error("token validation backend failure: {0}")]
    Backend(String),
}

/// Turns an opaque bearer token into an authenticated identity.
///
/// The token's bit-exact format is the concern of the minting side;
/// any adapter fulfilling this contract is acceptable.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate `token` and extract the identity it carries.
    async fn validate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Validator over a fixed token table.
///
/// The standalone deployment feeds this from configuration; tests feed
/// it directly. Anything more (JWT verification against an issuer)
/// plugs in behind [`TokenValidator`] without touching the relay.
#[derive(Debug, Default)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenValidator {
    /// Build from `(token, identity)` pairs.
    #[must_use]
    pub fn new(pairs: impl IntoIterator<Item = (String, Identity)>) -> Self {
        Self {
            tokens: pairs.into_iter().collect(),
        }
    }

    /// Register one token.
    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }
}

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glimpse_core::UserRole;

    #[tokio::test]
    async fn known_token_yields_identity() {
        let mut validator = StaticTokenValidator::default();
        validator.insert("tok-1", Identity::new("alice", UserRole::User));

        let identity = validator.validate("tok-1").await.unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.role, UserRole::User);
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let validator = StaticTokenValidator::default();
        assert_eq!(
            validator.validate("nope").await.unwrap_err(),
            AuthError::InvalidToken
        );
    }
}
