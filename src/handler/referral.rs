// handler/referral.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use validator::Validate;

use crate::{
    dtos::referraldtos::*,
    error::{ErrorMessage, HttpError},
    service::{
        error::ServiceError,
        referral::{generate_referral_link, validate_code},
    },
    AppState,
};

pub fn referral_handler() -> Router {
    Router::new()
        .route("/codes", post(assign_referral_code))
        .route("/codes/:code", get(get_referral_code))
        .route("/codes/:code/validate", get(validate_referral_code))
}

pub async fn assign_referral_code(
    Extension(app_state): Extension<Arc<AppState>>,
    Json(body): Json<AssignReferralCodeDto>,
) -> Result<impl IntoResponse, HttpError> {
    let record = app_state
        .referral_service
        .assign_code(body.user_id)
        .await
        .map_err(HttpError::from)?;

    let link = generate_referral_link(&app_state.env.app_url, &record.code);

    Ok(Json(ReferralCodeResponseDto {
        status: "success".to_string(),
        data: ReferralCodeDto::from_record(record, link),
    }))
}

pub async fn get_referral_code(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(params): Path<ReferralCodePathDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let record = app_state
        .referral_service
        .lookup(&params.code)
        .await
        .map_err(|e| match e {
            ServiceError::NotFound(_) => {
                HttpError::not_found(ErrorMessage::ReferralCodeNotFound.to_string())
            }
            other => HttpError::from(other),
        })?;

    let link = generate_referral_link(&app_state.env.app_url, &record.code);

    Ok(Json(ReferralCodeResponseDto {
        status: "success".to_string(),
        data: ReferralCodeDto::from_record(record, link),
    }))
}

/// Checksum-only check; never touches storage.
pub async fn validate_referral_code(
    Path(params): Path<ReferralCodePathDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let result = match validate_code(&params.code) {
        Ok(code) => ReferralCodeValidationDto { code, valid: true },
        Err(_) => ReferralCodeValidationDto {
            code: params.code.trim().to_string(),
            valid: false,
        },
    };

    Ok(Json(result))
}
