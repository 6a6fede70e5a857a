use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::referralmodel::ReferralCodeRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignReferralCodeDto {
    pub user_id: Uuid,
}

#[derive(Validate, Debug, Clone, Serialize, Deserialize)]
pub struct ReferralCodePathDto {
    #[validate(length(min = 1, max = 16, message = "Referral code must be 1-16 characters"))]
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReferralCodeDto {
    pub user_id: Uuid,
    pub code: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

impl ReferralCodeDto {
    pub fn from_record(record: ReferralCodeRecord, link: String) -> Self {
        ReferralCodeDto {
            user_id: record.user_id,
            code: record.code,
            link,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReferralCodeResponseDto {
    pub status: String,
    pub data: ReferralCodeDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReferralCodeValidationDto {
    pub code: String,
    pub valid: bool,
}
