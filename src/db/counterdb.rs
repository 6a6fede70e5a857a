// db/counterdb.rs
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use super::db::DBClient;
use crate::models::referralmodel::ReferralCounter;
use crate::service::error::ServiceError;

pub const REDIS_COUNTER_PREFIX: &str = "referral:counter:";

/// Per-shard counters backing referral code generation.
///
/// `increment` must be a single atomic read-modify-write in the backing store:
/// two callers, in the same process or not, never observe the same value for
/// one shard.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments the shard's counter and returns the new value.
    async fn increment(&self, shard: char) -> Result<i64, ServiceError>;

    /// Makes sure every shard has a counter, leaving existing ones untouched.
    async fn seed_shards(&self, _shards: &[char]) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Connection-level failures are worth retrying; anything else is a real
/// database error.
pub fn storage_error(err: sqlx::Error) -> ServiceError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => ServiceError::StorageUnavailable(err.to_string()),
        other => ServiceError::Database(other),
    }
}

fn redis_key(shard: char) -> String {
    format!("{}{}", REDIS_COUNTER_PREFIX, shard)
}

impl DBClient {
    async fn increment_pg(&self, shard: char) -> Result<i64, ServiceError> {
        // Upsert keeps the increment atomic even if seeding missed this shard.
        let counter = sqlx::query_as::<_, ReferralCounter>(
            r#"
            INSERT INTO referral_counters (shard_key, next_value, updated_at)
            VALUES ($1, 1, NOW())
            ON CONFLICT (shard_key)
            DO UPDATE SET next_value = referral_counters.next_value + 1, updated_at = NOW()
            RETURNING shard_key, next_value, updated_at
            "#,
        )
        .bind(shard.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(counter.next_value)
    }

    async fn increment_redis(
        &self,
        redis: &ConnectionManager,
        shard: char,
    ) -> Result<i64, ServiceError> {
        let mut conn = ConnectionManager::clone(redis);
        conn.incr(redis_key(shard), 1_i64)
            .await
            .map_err(|e| ServiceError::StorageUnavailable(e.to_string()))
    }
}

#[async_trait]
impl CounterStore for DBClient {
    async fn increment(&self, shard: char) -> Result<i64, ServiceError> {
        match &self.redis_client {
            Some(redis) => self.increment_redis(redis, shard).await,
            None => self.increment_pg(shard).await,
        }
    }

    async fn seed_shards(&self, shards: &[char]) -> Result<(), ServiceError> {
        if let Some(redis) = &self.redis_client {
            let mut conn = ConnectionManager::clone(redis);
            for shard in shards {
                let _: bool = conn
                    .set_nx(redis_key(*shard), 0_i64)
                    .await
                    .map_err(|e| ServiceError::StorageUnavailable(e.to_string()))?;
            }
            tracing::debug!("Seeded {} Redis referral counters", shards.len());
            return Ok(());
        }

        let keys: Vec<String> = shards.iter().map(|c| c.to_string()).collect();
        let inserted = sqlx::query(
            r#"
            INSERT INTO referral_counters (shard_key, next_value, updated_at)
            SELECT key, 0, NOW() FROM UNNEST($1::text[]) AS key
            ON CONFLICT (shard_key) DO NOTHING
            "#,
        )
        .bind(keys)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?
        .rows_affected();

        tracing::debug!("Seeded {} missing referral counters", inserted);
        Ok(())
    }
}
