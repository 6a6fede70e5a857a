// db/referraldb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::counterdb::storage_error;
use super::db::DBClient;
use crate::models::referralmodel::ReferralCodeRecord;
use crate::service::error::ServiceError;

/// Persistence for issued referral codes. The unique constraint on `code` is
/// the only collision signal the generator gets.
#[async_trait]
pub trait ReferralCodeStore: Send + Sync {
    /// Stores `code` for `user_id`. Returns `CollisionRejected` when the code is
    /// taken; if the user already owns a code, that record is returned instead.
    async fn insert_code(&self, user_id: Uuid, code: &str) -> Result<ReferralCodeRecord, ServiceError>;

    async fn get_code_by_user(&self, user_id: Uuid) -> Result<Option<ReferralCodeRecord>, ServiceError>;

    async fn get_code(&self, code: &str) -> Result<Option<ReferralCodeRecord>, ServiceError>;
}

#[async_trait]
impl ReferralCodeStore for DBClient {
    async fn insert_code(&self, user_id: Uuid, code: &str) -> Result<ReferralCodeRecord, ServiceError> {
        let inserted = sqlx::query_as::<_, ReferralCodeRecord>(
            r#"
            INSERT INTO referral_codes (user_id, code, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id) DO NOTHING
            RETURNING user_id, code, created_at
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await;

        match inserted {
            Ok(Some(record)) => Ok(record),
            // Lost a race with another request for the same user.
            Ok(None) => self
                .get_code_by_user(user_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("referral code for user {}", user_id))),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(ServiceError::CollisionRejected(code.to_string()))
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn get_code_by_user(&self, user_id: Uuid) -> Result<Option<ReferralCodeRecord>, ServiceError> {
        sqlx::query_as::<_, ReferralCodeRecord>(
            r#"
            SELECT user_id, code, created_at
            FROM referral_codes
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)
    }

    async fn get_code(&self, code: &str) -> Result<Option<ReferralCodeRecord>, ServiceError> {
        sqlx::query_as::<_, ReferralCodeRecord>(
            r#"
            SELECT user_id, code, created_at
            FROM referral_codes
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)
    }
}
