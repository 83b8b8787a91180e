//! Bearer token lifecycle
//!
//! Tokens are opaque random strings stored in the key-value store, keyed by
//! the token value itself. Presence of the stored record is the sole proof of
//! validity; there is no credential comparison step and no expiry.

use kvstore::{Item, StoreTable};

use crate::error::{HarbormasterError, HarbormasterResult};

/// Attribute holding the owning user identifier.
const USER_ATTRIBUTE: &str = "user";

/// Attribute holding the token value.
const TOKEN_ATTRIBUTE: &str = "token";

/// Manages the lifecycle of the bearer tokens gating the admin API.
#[derive(Debug, Clone)]
pub struct TokenManager {
    tokens: StoreTable,
}

impl TokenManager {
    /// Create a new token manager over the given token table.
    pub fn new(tokens: StoreTable) -> Self {
        Self { tokens }
    }

    /// Create a fresh token for the given user.
    ///
    /// Each call produces a new token record; a user may hold several live
    /// tokens at once.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, user: &str) -> HarbormasterResult<String> {
        if user.is_empty() {
            return Err(HarbormasterError::InvalidUser(user.to_string()));
        }

        let token = uuid::Uuid::new_v4().to_string();

        let mut item = Item::new();
        item.insert(USER_ATTRIBUTE.to_string(), user.to_string());
        item.insert(TOKEN_ATTRIBUTE.to_string(), token.clone());

        self.tokens.put_item(&token, item).await?;

        tracing::debug!(%user, "Created token");
        Ok(token)
    }

    /// Delete a token.
    ///
    /// Deleting a token that does not exist is not an error.
    #[tracing::instrument(skip(self, token))]
    pub async fn delete(&self, token: &str) -> HarbormasterResult<()> {
        self.tokens.delete_item(token).await?;
        Ok(())
    }

    /// Check whether the given user/token pair is valid.
    ///
    /// Performs a consistent point lookup keyed by the token value, so the
    /// result reflects the most recent create or delete for the same token.
    /// Returns `Ok(false)` when no record exists; errors only surface store
    /// failures.
    #[tracing::instrument(skip(self, token))]
    pub async fn authenticate(&self, user: &str, token: &str) -> HarbormasterResult<bool> {
        let item = self.tokens.get_item(token, true).await?;

        if item.is_none() {
            tracing::debug!(%user, "No token record found");
        }

        Ok(item.is_some())
    }
}
