// routes.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{kyc::kyc_handler, referral::referral_handler, webhook::webhook_handler},
    middleware::{rate_limit_middleware, webhook_rate_limiter},
    AppState,
};

// Health check handler
async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Public but signature-checked; rate limited per client address
    let webhook_routes = webhook_handler().layer(middleware::from_fn_with_state(
        Arc::new(webhook_rate_limiter()),
        rate_limit_middleware,
    ));

    let api_route = Router::new()
        .nest("/referral", referral_handler())
        .nest("/webhook", webhook_routes)
        .nest("/kyc", kyc_handler())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}
