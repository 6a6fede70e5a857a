// Store round-trip timeout protection
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::service::error::ServiceError;

pub struct QueryTimeout;

impl QueryTimeout {
    /// Runs a store call under a deadline. Expiry is reported as
    /// `StorageUnavailable` so callers can retry; the pending call is dropped.
    pub async fn execute_with_timeout<F, T>(
        query_fn: F,
        timeout_duration: Duration,
    ) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        match timeout(timeout_duration, query_fn).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::StorageUnavailable(format!(
                "store call timed out after {:?}",
                timeout_duration
            ))),
        }
    }

    /// Default timeout for counter increments (5 seconds)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
}
