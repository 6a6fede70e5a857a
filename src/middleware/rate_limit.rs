// Rate limiting middleware for inbound webhooks
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{ErrorMessage, HttpError};

/// Above this many tracked clients, idle entries are swept on the next request.
const SWEEP_THRESHOLD: usize = 10_000;

// In-memory sliding window; each instance limits independently.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.is_allowed_at(key, Instant::now())
    }

    fn is_allowed_at(&self, key: &str, now: Instant) -> bool {
        let mut requests = self
            .requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if requests.len() > SWEEP_THRESHOLD {
            let window = self.window;
            requests.retain(|_, stamps| {
                stamps.retain(|&t| now.duration_since(t) < window);
                !stamps.is_empty()
            });
        }

        let entry = requests.entry(key.to_string()).or_default();

        // Remove old requests outside the window
        entry.retain(|&timestamp| now.duration_since(timestamp) < self.window);

        if entry.len() < self.max_requests {
            entry.push(now);
            true
        } else {
            false
        }
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client_id = get_client_id(&request);

    if !limiter.is_allowed(&client_id) {
        tracing::warn!("Rate limit exceeded for {} on {}", client_id, request.uri().path());
        return HttpError::new(
            ErrorMessage::TooManyRequests.to_string(),
            axum::http::StatusCode::TOO_MANY_REQUESTS,
        )
        .into_response();
    }

    next.run(request).await
}

fn get_client_id(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

pub fn webhook_rate_limiter() -> RateLimiter {
    RateLimiter::new(100, Duration::from_secs(60)) // 100 webhooks per minute
}
