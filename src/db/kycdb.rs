// db/kycdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::counterdb::storage_error;
use super::db::DBClient;
use crate::models::kycmodel::{KycCheck, KycStatus};
use crate::service::error::ServiceError;

#[async_trait]
pub trait KycStore: Send + Sync {
    /// Records the latest verdict from `provider`; a later call for the same
    /// user and provider replaces the earlier one.
    async fn upsert_check(
        &self,
        user_id: Uuid,
        provider: &str,
        status: KycStatus,
        reference: Option<String>,
    ) -> Result<KycCheck, ServiceError>;

    async fn list_checks(&self, user_id: Uuid) -> Result<Vec<KycCheck>, ServiceError>;
}

#[async_trait]
impl KycStore for DBClient {
    async fn upsert_check(
        &self,
        user_id: Uuid,
        provider: &str,
        status: KycStatus,
        reference: Option<String>,
    ) -> Result<KycCheck, ServiceError> {
        sqlx::query_as::<_, KycCheck>(
            r#"
            INSERT INTO kyc_checks (user_id, provider, status, reference, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (user_id, provider)
            DO UPDATE SET status = EXCLUDED.status,
                          reference = COALESCE(EXCLUDED.reference, kyc_checks.reference),
                          updated_at = NOW()
            RETURNING user_id, provider, status, reference, updated_at
            "#,
        )
        .bind(user_id)
        .bind(provider)
        .bind(status)
        .bind(reference)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)
    }

    async fn list_checks(&self, user_id: Uuid) -> Result<Vec<KycCheck>, ServiceError> {
        sqlx::query_as::<_, KycCheck>(
            r#"
            SELECT user_id, provider, status, reference, updated_at
            FROM kyc_checks
            WHERE user_id = $1
            ORDER BY provider
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)
    }
}
