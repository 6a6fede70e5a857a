use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::kycmodel::{KycCheck, KycStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct KycSummaryDto {
    pub user_id: Uuid,
    pub status: KycStatus,
    pub checks: Vec<KycCheck>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KycSummaryResponseDto {
    pub status: String,
    pub data: KycSummaryDto,
}
