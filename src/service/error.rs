use axum::http::StatusCode;
use thiserror::Error;

use crate::error::{ErrorMessage, HttpError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Counter store unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Referral code {0} already exists")]
    CollisionRejected(String),

    #[error("Could not assign a unique referral code after {0} attempts")]
    CollisionRetriesExhausted(u32),

    #[error("Counter for shard {shard} exhausted at value {value}")]
    CounterExhausted { shard: char, value: i64 },

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Missing webhook secret for {0}")]
    MissingSecret(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid referral code: {0}")]
    InvalidReferralCode(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl ServiceError {
    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::StorageUnavailable(_)
                | ServiceError::CollisionRejected(_)
                | ServiceError::Redis(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::StorageUnavailable(_)
            | ServiceError::CounterExhausted { .. }
            | ServiceError::Redis(_) => StatusCode::SERVICE_UNAVAILABLE,

            ServiceError::CollisionRejected(_)
            | ServiceError::CollisionRetriesExhausted(_) => StatusCode::CONFLICT,

            ServiceError::InvalidSignature => StatusCode::UNAUTHORIZED,

            ServiceError::InvalidReferralCode(_)
            | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,

            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::MissingSecret(_)
            | ServiceError::Config(_)
            | ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let status = error.status_code();
        match error {
            ServiceError::InvalidSignature => {
                HttpError::unauthorized(ErrorMessage::InvalidSignature.to_string())
            }
            ServiceError::InvalidReferralCode(_) => {
                HttpError::bad_request(ErrorMessage::InvalidReferralCode.to_string())
            }
            // Internal details stay in the logs.
            ServiceError::Database(_)
            | ServiceError::MissingSecret(_)
            | ServiceError::Config(_) => {
                tracing::error!("{}", error);
                HttpError::server_error(ErrorMessage::ServerError.to_string())
            }
            _ => HttpError::new(error.to_string(), status),
        }
    }
}
