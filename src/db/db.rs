// db/db.rs
use sqlx::{Pool, Postgres};
use redis::aio::ConnectionManager;
use std::sync::Arc;

#[derive(Clone)]
pub struct DBClient {
    pub pool: Pool<Postgres>,
    pub redis_client: Option<Arc<ConnectionManager>>,
}

impl std::fmt::Debug for DBClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBClient")
            .field("pool", &"Pool<Postgres>")
            .field("redis_client", &self.redis_client.is_some())
            .finish()
    }
}

impl DBClient {
    /// Create a new DBClient with PostgreSQL pool only
    pub fn new(pool: Pool<Postgres>) -> Self {
        DBClient {
            pool,
            redis_client: None,
        }
    }

    /// Create a new DBClient with both PostgreSQL and Redis.
    ///
    /// Unlike a cache, the Redis counter backend cannot silently degrade, so a
    /// failed connection is returned to the caller.
    pub async fn with_redis(pool: Pool<Postgres>, redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Redis connection established");

        Ok(DBClient {
            pool,
            redis_client: Some(Arc::new(conn)),
        })
    }

    pub fn is_redis_available(&self) -> bool {
        self.redis_client.is_some()
    }
}
