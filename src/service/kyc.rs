// service/kyc.rs
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::error::ServiceError;
use super::webhook::WebhookProvider;
use crate::db::KycStore;
use crate::dtos::kycdtos::KycSummaryDto;
use crate::models::kycmodel::{KycCheck, KycStatus};

const SMILE_ID_APPROVED: [&str; 3] = ["1012", "0810", "1210"];
const SMILE_ID_REJECTED: [&str; 4] = ["1013", "0811", "1011", "1022"];

/// Collapses per-provider verdicts into one: a single approval is enough,
/// otherwise an open check outranks a rejection.
pub fn aggregate<I>(statuses: I) -> KycStatus
where
    I: IntoIterator<Item = KycStatus>,
{
    let mut overall = KycStatus::NotStarted;
    for status in statuses {
        overall = match (overall, status) {
            (_, KycStatus::Approved) | (KycStatus::Approved, _) => KycStatus::Approved,
            (_, KycStatus::Pending) | (KycStatus::Pending, _) => KycStatus::Pending,
            (_, KycStatus::Rejected) | (KycStatus::Rejected, _) => KycStatus::Rejected,
            _ => KycStatus::NotStarted,
        };
    }
    overall
}

#[derive(Debug, Clone, PartialEq)]
pub struct KycUpdate {
    pub user_id: Uuid,
    pub status: KycStatus,
    pub reference: Option<String>,
}

fn parse_user_id(raw: Option<&str>, field: &str) -> Result<Uuid, ServiceError> {
    let raw = raw.ok_or_else(|| ServiceError::Validation(format!("Missing {} in KYC webhook", field)))?;
    Uuid::parse_str(raw).map_err(|_| ServiceError::Validation(format!("{} is not a valid user id", field)))
}

pub fn parse_sumsub(payload: &Value) -> Result<KycUpdate, ServiceError> {
    let user_id = parse_user_id(payload["externalUserId"].as_str(), "externalUserId")?;

    let status = match payload["reviewResult"]["reviewAnswer"].as_str() {
        Some("GREEN") => KycStatus::Approved,
        Some("RED") => KycStatus::Rejected,
        _ => KycStatus::Pending,
    };

    Ok(KycUpdate {
        user_id,
        status,
        reference: payload["applicantId"].as_str().map(str::to_string),
    })
}

pub fn parse_smile_id(payload: &Value) -> Result<KycUpdate, ServiceError> {
    let user_id = parse_user_id(payload["PartnerParams"]["user_id"].as_str(), "PartnerParams.user_id")?;

    let status = match payload["ResultCode"].as_str() {
        Some(code) if SMILE_ID_APPROVED.contains(&code) => KycStatus::Approved,
        Some(code) if SMILE_ID_REJECTED.contains(&code) => KycStatus::Rejected,
        _ => KycStatus::Pending,
    };

    Ok(KycUpdate {
        user_id,
        status,
        reference: payload["SmileJobID"].as_str().map(str::to_string),
    })
}

pub struct KycService {
    store: Arc<dyn KycStore>,
}

impl std::fmt::Debug for KycService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KycService").finish_non_exhaustive()
    }
}

impl KycService {
    pub fn new(store: Arc<dyn KycStore>) -> Self {
        Self { store }
    }

    /// Stores the verdict carried by a verified identity-provider webhook.
    /// Payment providers carry no KYC data and yield `None`.
    pub async fn record_webhook(
        &self,
        provider: WebhookProvider,
        payload: &Value,
    ) -> Result<Option<KycCheck>, ServiceError> {
        let update = match provider {
            WebhookProvider::Sumsub => parse_sumsub(payload)?,
            WebhookProvider::SmileId => parse_smile_id(payload)?,
            _ => return Ok(None),
        };

        let check = self
            .store
            .upsert_check(update.user_id, provider.slug(), update.status, update.reference)
            .await?;

        tracing::info!(
            "KYC status for user {} from {}: {}",
            check.user_id,
            provider,
            check.status.to_str()
        );
        Ok(Some(check))
    }

    pub async fn summary(&self, user_id: Uuid) -> Result<KycSummaryDto, ServiceError> {
        let checks = self.store.list_checks(user_id).await?;
        let status = aggregate(checks.iter().map(|c| c.status));

        Ok(KycSummaryDto {
            user_id,
            status,
            checks,
        })
    }
}
