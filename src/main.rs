mod models;
mod service;
mod config;
mod dtos;
mod error;
mod db;
mod middleware;
mod handler;
mod routes;

use std::sync::Arc;

use axum::http::{header::{ACCEPT, CONTENT_TYPE}, HeaderValue, Method};
use config::{Config, StorageBackend};
use db::{
    counterdb::storage_error, db::DBClient, memory::MemoryStore, CounterStore, KycStore,
    ReferralCodeStore,
};
use dotenv::dotenv;
use routes::create_router;
use service::{
    error::ServiceError, kyc::KycService, referral::ReferralService, webhook::WebhookVerifier,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub referral_service: Arc<ReferralService>,
    pub kyc_service: Arc<KycService>,
    pub webhook_verifier: Arc<WebhookVerifier>,
}

impl AppState {
    pub fn new(
        config: Config,
        counters: Arc<dyn CounterStore>,
        codes: Arc<dyn ReferralCodeStore>,
        kyc_store: Arc<dyn KycStore>,
    ) -> Result<Self, ServiceError> {
        let referral_service = ReferralService::new(counters, codes)
            .with_max_attempts(config.referral_max_attempts)
            .with_counter_timeout(config.counter_timeout);
        let webhook_verifier = WebhookVerifier::new(config.webhook_secrets.clone())?;

        Ok(Self {
            env: config,
            referral_service: Arc::new(referral_service),
            kyc_service: Arc::new(KycService::new(kyc_store)),
            webhook_verifier: Arc::new(webhook_verifier),
        })
    }
}

async fn build_state(config: &Config) -> Result<AppState, ServiceError> {
    if config.storage_backend == StorageBackend::Memory {
        tracing::warn!("Using in-memory storage; referral counters are local to this process");
        let store = Arc::new(MemoryStore::new());
        return AppState::new(config.clone(), store.clone(), store.clone(), store);
    }

    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| ServiceError::Config("DATABASE_URL must be set".to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(database_url)
        .await
        .map_err(storage_error)?;
    tracing::info!("Connection to the database is successful");

    let db_client = match (config.storage_backend, config.redis_url.as_deref()) {
        (StorageBackend::Redis, Some(redis_url)) => DBClient::with_redis(pool, redis_url).await?,
        (StorageBackend::Redis, None) => {
            return Err(ServiceError::Config("REDIS_URL must be set".to_string()));
        }
        _ => DBClient::new(pool),
    };
    tracing::info!(
        "Referral counters backed by {}",
        if db_client.is_redis_available() { "Redis" } else { "PostgreSQL" }
    );

    let db_client = Arc::new(db_client);
    AppState::new(config.clone(), db_client.clone(), db_client.clone(), db_client)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = match Config::init() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("🔥 Invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();
    tracing::debug!("Loaded {:?}", config);

    let app_state = match build_state(&config).await {
        Ok(state) => Arc::new(state),
        Err(err) => {
            tracing::error!("🔥 Failed to initialise storage: {}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = app_state.referral_service.seed_counters().await {
        tracing::error!("🔥 Failed to seed referral counters: {}", err);
        std::process::exit(1);
    }

    let cors = match config.app_url.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::list([origin]))
            .allow_headers([ACCEPT, CONTENT_TYPE])
            .allow_methods([Method::GET, Method::POST]),
        Err(_) => {
            tracing::warn!("APP_URL is not a valid origin; CORS disabled");
            CorsLayer::new()
        }
    };

    let app = create_router(app_state.clone()).layer(cors);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("🔥 Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    tracing::info!("🚀 Server is running on http://localhost:{}", config.port);

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", err);
    }
}
