use crate::domain::owner::OwnerId;
use crate::domain::provider::Provider;
use crate::domain::token::{PushToken, TokenId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("This token is already registered for this push system")]
    DuplicateToken,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence of push tokens, keyed by `(owner, token_id)`.
///
/// Implementations must reject a `(token, provider)` pair that is already
/// stored, regardless of owner, with `StoreError::DuplicateToken`.
#[async_trait]
pub trait TokenStore<Id: OwnerId>: Send + Sync + std::fmt::Debug {
    /// Loads every token registered by `owner`.
    async fn load(&self, owner: &Id) -> Result<Vec<PushToken>, StoreError>;

    /// Stores a new token and returns its id.
    async fn insert(&self, provider: Provider, token: &str, owner: &Id) -> Result<TokenId, StoreError>;

    /// Replaces the token and provider of an existing record.
    /// Returns `false` if `owner` has no token with this id.
    async fn update(&self, token_id: TokenId, owner: &Id, provider: Provider, token: &str) -> Result<bool, StoreError>;

    /// Removes a token. Returns `false` if `owner` has no token with this id.
    async fn delete(&self, token_id: TokenId, owner: &Id) -> Result<bool, StoreError>;
}
