//! The user-account store contract.
//!
//! Durable account storage lives outside the relay; the core only
//! consumes this interface. The in-memory implementation backs tests
//! and the standalone deployment.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use glimpse_core::{Identity, UserRole};

use crate::token::{AuthError, TokenValidator};

/// A stored account, as the relay sees it.
#[derive(Debug, Clone)]
pub struct UserAccount {
    /// Canonical (lowercased) username.
    pub username: String,
    /// Account role.
    pub role: UserRole,
}

/// Account lookup by bearer token.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// The account a live token resolves to, if any.
    async fn find_by_token(&self, token: &str) -> Result<Option<UserAccount>, AuthError>;
}

/// In-memory [`UserStore`].
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    by_token: RwLock<HashMap<String, UserAccount>>,
}

impl MemoryUserStore {
    /// Associate a token with an account.
    pub fn insert_token(&self, token: impl Into<String>, account: UserAccount) {
        if let Ok(mut map) = self.by_token.write() {
            map.insert(token.into(), account);
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<UserAccount>, AuthError> {
        self.by_token
            .read()
            .map(|map| map.get(token).cloned())
            .map_err(|e| AuthError::Backend(e.to_string()))
    }
}

/// Token validator backed by a [`UserStore`].
///
/// This is the adapter a deployment with real account storage plugs
/// into the relay; the relay only ever sees [`TokenValidator`].
pub struct StoreTokenValidator {
    store: std::sync::Arc<dyn UserStore>,
}

impl StoreTokenValidator {
    /// Wrap a user store.
    #[must_use]
    pub fn new(store: std::sync::Arc<dyn UserStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TokenValidator for StoreTokenValidator {
    async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        match self.store.find_by_token(token).await? {
            Some(account) => Ok(Identity::new(account.username, account.role)),
            None => Err(AuthError::InvalidToken),
        }
    }
}
