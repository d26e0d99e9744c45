//! Timeout and retry policy for calls to the auth provider.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::api::ApiError;

/// Per-attempt timeout.
/// 15s is well under the HTTP client's own limit so a hung call is caught here first.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// One retry covers a dropped connection without stalling a tick for long.
pub const DEFAULT_RETRIES: u32 = 1;

/// Initial backoff delay in milliseconds, doubled per retry.
pub const DEFAULT_BACKOFF_MS: u64 = 1000;

/// Backoff stops doubling here.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: DEFAULT_RETRIES,
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
        }
    }
}

impl RequestPolicy {
    /// Policy that gives up after the first failure
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Run `call` under the timeout, retrying transient failures with
    /// exponential backoff. Rejections are returned immediately.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt = 0;
        let mut backoff = self.backoff;

        loop {
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ApiError::Timeout(self.timeout.as_secs())),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        operation,
                        retry = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2).min(MAX_BACKOFF);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
