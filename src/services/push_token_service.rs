use crate::domain::owner::OwnerId;
use crate::domain::provider::Provider;
use crate::domain::token::TokenId;
use crate::error::Result;
use crate::services::token_store::TokenStore;
use std::sync::Arc;

#[derive(Debug)]
pub struct PushTokenService<Id: OwnerId> {
    store: Arc<dyn TokenStore<Id>>,
}

impl<Id: OwnerId> Clone for PushTokenService<Id> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<Id: OwnerId> PushTokenService<Id> {
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore<Id>>) -> Self {
        Self { store }
    }

    /// Registers a new push token for an owner.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if the token is already registered for this provider.
    #[tracing::instrument(level = "debug", skip(self, token), fields(owner = %owner), err)]
    pub async fn register_token(&self, owner: &Id, provider: Provider, token: &str) -> Result<TokenId> {
        let token_id = self.store.insert(provider, token, owner).await?;
        tracing::info!(%token_id, %provider, "Push token registered");
        Ok(token_id)
    }

    /// Replaces an existing token, e.g. after the device rotated it.
    /// Returns `false` if the owner has no token with this id.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if the new token is already registered for this provider.
    #[tracing::instrument(level = "debug", skip(self, token), fields(owner = %owner), err)]
    pub async fn update_token(&self, owner: &Id, token_id: TokenId, provider: Provider, token: &str) -> Result<bool> {
        let updated = self.store.update(token_id, owner, provider, token).await?;
        if !updated {
            tracing::debug!(%token_id, "No token to update");
        }
        Ok(updated)
    }

    /// Removes a token. Returns `false` if the owner has no token with this id.
    ///
    /// # Errors
    /// Returns `AppError::Store` if the storage operation fails.
    #[tracing::instrument(level = "debug", skip(self), fields(owner = %owner), err)]
    pub async fn delete_token(&self, owner: &Id, token_id: TokenId) -> Result<bool> {
        Ok(self.store.delete(token_id, owner).await?)
    }
}
