use crate::adapters::database::DbPool;
use crate::domain::owner::OwnerId;
use crate::domain::provider::Provider;
use crate::domain::token::{PushToken, TokenId};
use crate::services::token_store::{StoreError, TokenStore};
use async_trait::async_trait;
use sqlx::Postgres;
use std::marker::PhantomData;

/// Owner id types with a dedicated Postgres table.
pub trait PgOwnerId: OwnerId + for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> {
    const TABLE: &'static str;
}

impl PgOwnerId for i64 {
    const TABLE: &'static str = "notification_tokens_long";
}

impl PgOwnerId for uuid::Uuid {
    const TABLE: &'static str = "notification_tokens_uuid";
}

impl PgOwnerId for String {
    const TABLE: &'static str = "notification_tokens_text";
}

#[derive(Debug)]
pub struct PushTokenRepository<Id> {
    pool: DbPool,
    _owner: PhantomData<fn() -> Id>,
}

impl<Id> Clone for PushTokenRepository<Id> {
    fn clone(&self) -> Self {
        Self { pool: self.pool.clone(), _owner: PhantomData }
    }
}

impl<Id: PgOwnerId> PushTokenRepository<Id> {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool, _owner: PhantomData }
    }
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateToken,
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl<Id: PgOwnerId> TokenStore<Id> for PushTokenRepository<Id> {
    #[tracing::instrument(level = "debug", skip(self), fields(table = Id::TABLE), err)]
    async fn load(&self, owner: &Id) -> Result<Vec<PushToken>, StoreError> {
        let sql = format!("SELECT token, provider FROM {} WHERE owner_id = $1", Id::TABLE);
        let rows: Vec<(String, String)> =
            sqlx::query_as(&sql).bind(owner.clone()).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|(token, provider)| {
                let provider =
                    provider.parse::<Provider>().map_err(|e| StoreError::Database(sqlx::Error::Decode(e.into())))?;
                Ok(PushToken { token, provider })
            })
            .collect()
    }

    #[tracing::instrument(level = "debug", skip(self, token), fields(table = Id::TABLE), err)]
    async fn insert(&self, provider: Provider, token: &str, owner: &Id) -> Result<TokenId, StoreError> {
        let sql = format!(
            "INSERT INTO {} (owner_id, provider, token) VALUES ($1, $2, $3) RETURNING token_id",
            Id::TABLE
        );
        sqlx::query_scalar::<_, TokenId>(&sql)
            .bind(owner.clone())
            .bind(provider.as_str())
            .bind(token)
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)
    }

    #[tracing::instrument(level = "debug", skip(self, token), fields(table = Id::TABLE), err)]
    async fn update(&self, token_id: TokenId, owner: &Id, provider: Provider, token: &str) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET provider = $3, token = $4 WHERE owner_id = $1 AND token_id = $2",
            Id::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(owner.clone())
            .bind(token_id)
            .bind(provider.as_str())
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(map_unique_violation)?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(level = "debug", skip(self), fields(table = Id::TABLE), err)]
    async fn delete(&self, token_id: TokenId, owner: &Id) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE owner_id = $1 AND token_id = $2", Id::TABLE);
        let result = sqlx::query(&sql).bind(owner.clone()).bind(token_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
