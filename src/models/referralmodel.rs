use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per shard symbol; `next_value` only ever grows.
#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct ReferralCounter {
    pub shard_key: String,
    pub next_value: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, sqlx::FromRow)]
pub struct ReferralCodeRecord {
    pub user_id: Uuid,
    pub code: String,
    pub created_at: DateTime<Utc>,
}
