// handler/kyc.rs
use std::sync::Arc;

use axum::{extract::Path, response::IntoResponse, routing::get, Extension, Json, Router};
use uuid::Uuid;

use crate::{dtos::kycdtos::KycSummaryResponseDto, error::HttpError, AppState};

pub fn kyc_handler() -> Router {
    Router::new().route("/:user_id", get(get_kyc_status))
}

pub async fn get_kyc_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let summary = app_state
        .kyc_service
        .summary(user_id)
        .await
        .map_err(HttpError::from)?;

    Ok(Json(KycSummaryResponseDto {
        status: "success".to_string(),
        data: summary,
    }))
}
