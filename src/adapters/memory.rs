use crate::domain::owner::OwnerId;
use crate::domain::provider::Provider;
use crate::domain::token::{PushToken, TokenId};
use crate::services::token_store::{StoreError, TokenStore};
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct TokenRecord<Id> {
    token_id: TokenId,
    owner: Id,
    provider: Provider,
    token: String,
}

/// Process-local token store with the same constraints as the Postgres one.
#[derive(Debug)]
pub struct InMemoryTokenStore<Id> {
    records: RwLock<Vec<TokenRecord<Id>>>,
}

impl<Id> Default for InMemoryTokenStore<Id> {
    fn default() -> Self {
        Self { records: RwLock::new(Vec::new()) }
    }
}

impl<Id> InMemoryTokenStore<Id> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<Id: OwnerId> TokenStore<Id> for InMemoryTokenStore<Id> {
    async fn load(&self, owner: &Id) -> Result<Vec<PushToken>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|r| &r.owner == owner)
            .map(|r| PushToken::new(r.token.clone(), r.provider))
            .collect())
    }

    async fn insert(&self, provider: Provider, token: &str, owner: &Id) -> Result<TokenId, StoreError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.provider == provider && r.token == token) {
            return Err(StoreError::DuplicateToken);
        }
        let token_id = Uuid::new_v4();
        records.push(TokenRecord { token_id, owner: owner.clone(), provider, token: token.to_string() });
        Ok(token_id)
    }

    async fn update(&self, token_id: TokenId, owner: &Id, provider: Provider, token: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let clash = records
            .iter()
            .any(|r| r.token_id != token_id && r.provider == provider && r.token == token);
        let Some(record) = records.iter_mut().find(|r| r.token_id == token_id && &r.owner == owner) else {
            return Ok(false);
        };
        if clash {
            return Err(StoreError::DuplicateToken);
        }
        record.provider = provider;
        record.token = token.to_string();
        Ok(true)
    }

    async fn delete(&self, token_id: TokenId, owner: &Id) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| !(r.token_id == token_id && &r.owner == owner));
        Ok(records.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_then_load() {
        let store = InMemoryTokenStore::<i64>::new();
        store.insert(Provider::Fcm, "fcm-token", &7).await.unwrap();

        let tokens = store.load(&7).await.unwrap();
        assert_eq!(tokens, vec![PushToken::new("fcm-token", Provider::Fcm)]);
        assert!(store.load(&8).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let store = InMemoryTokenStore::<String>::new();
        let owner = "alice".to_string();
        let id = store.insert(Provider::Apns, "old", &owner).await.unwrap();

        assert!(store.update(id, &owner, Provider::Fcm, "new").await.unwrap());
        assert_eq!(store.load(&owner).await.unwrap(), vec![PushToken::new("new", Provider::Fcm)]);

        // Deleting by the original id must still work after rotation.
        assert!(store.delete(id, &owner).await.unwrap());
        assert!(store.load(&owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_are_scoped_by_owner() {
        let store = InMemoryTokenStore::<String>::new();
        let id = store.insert(Provider::Fcm, "t", &"alice".to_string()).await.unwrap();
        let mallory = "mallory".to_string();

        assert!(!store.update(id, &mallory, Provider::Fcm, "hijack").await.unwrap());
        assert!(!store.delete(id, &mallory).await.unwrap());
        assert_eq!(store.load(&"alice".to_string()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_token_rejected_across_owners() {
        let store = InMemoryTokenStore::<i64>::new();
        store.insert(Provider::Fcm, "shared", &1).await.unwrap();

        let err = store.insert(Provider::Fcm, "shared", &2).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateToken));

        // Same literal token on another provider is a different endpoint.
        store.insert(Provider::Apns, "shared", &2).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_into_existing_pair_rejected() {
        let store = InMemoryTokenStore::<i64>::new();
        store.insert(Provider::Fcm, "a", &1).await.unwrap();
        let id = store.insert(Provider::Fcm, "b", &1).await.unwrap();

        let err = store.update(id, &1, Provider::Fcm, "a").await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateToken));
        // Re-saving the same value is not a clash with itself.
        assert!(store.update(id, &1, Provider::Fcm, "b").await.unwrap());
    }
}
