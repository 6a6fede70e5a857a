use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "kyc_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    NotStarted,
    Pending,
    Approved,
    Rejected,
}

impl KycStatus {
    pub fn to_str(&self) -> &str {
        match self {
            KycStatus::NotStarted => "not_started",
            KycStatus::Pending => "pending",
            KycStatus::Approved => "approved",
            KycStatus::Rejected => "rejected",
        }
    }
}

/// Latest verdict one identity provider reported for a user.
#[derive(Debug, Clone, Deserialize, Serialize, sqlx::FromRow)]
pub struct KycCheck {
    pub user_id: Uuid,
    pub provider: String,
    pub status: KycStatus,
    pub reference: Option<String>,
    pub updated_at: DateTime<Utc>,
}
