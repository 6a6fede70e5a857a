// handler/webhook.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Path,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};
use serde_json::Value;

use crate::{
    error::{ErrorMessage, HttpError},
    service::webhook::WebhookProvider,
    AppState,
};

pub fn webhook_handler() -> Router {
    Router::new().route("/:provider", post(receive_webhook))
}

/// Entry point for every provider. The body is taken as raw bytes so the
/// signature is checked against exactly what was sent.
pub async fn receive_webhook(
    Extension(app_state): Extension<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpError> {
    let provider = provider
        .parse::<WebhookProvider>()
        .ok()
        .filter(|p| app_state.webhook_verifier.is_enabled(*p))
        .ok_or_else(|| HttpError::not_found(ErrorMessage::UnknownProvider.to_string()))?;

    if !headers.contains_key(provider.signature_header()) {
        tracing::warn!("{} webhook received without {}", provider, provider.signature_header());
        return Err(HttpError::unauthorized(ErrorMessage::MissingSignature.to_string()));
    }

    app_state
        .webhook_verifier
        .verify_request(provider, &headers, &body)
        .map_err(|e| {
            tracing::warn!("Invalid {} webhook signature received", provider);
            HttpError::from(e)
        })?;

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| HttpError::bad_request(ErrorMessage::MalformedPayload.to_string()))?;

    tracing::info!("Received {} webhook: {}", provider, event_name(&payload));

    if provider.is_identity_provider() {
        app_state
            .kyc_service
            .record_webhook(provider, &payload)
            .await
            .map_err(HttpError::from)?;
    }

    Ok(Json(serde_json::json!({"status": "success"})))
}

fn event_name(payload: &Value) -> &str {
    payload
        .get("event")
        .or_else(|| payload.get("type"))
        .or_else(|| payload.get("ResultText"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
}
