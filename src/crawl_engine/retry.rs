//! Bounded retry with exponential backoff for transient driver failures
//!
//! Only transient failures (navigation errors, timeouts) are retried;
//! everything else surfaces immediately. The backoff sleep is a suspension
//! point and observes cancellation.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::infrastructure::browser::DriverError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay before the given retry attempt (1-based), doubling each time
    pub(crate) fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// Run `operation` until it succeeds, fails non-transiently, exhausts
    /// its attempts, or the token is cancelled (reported as a timeout-free
    /// `SessionClosed`, since the session is going away anyway).
    pub async fn run<T, F, Fut>(
        &self,
        token: &CancellationToken,
        mut operation: F,
    ) -> Result<T, DriverError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        let mut attempt = 0;
        loop {
            if token.is_cancelled() {
                return Err(DriverError::SessionClosed);
            }
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "transient failure (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.max_attempts, delay, error
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {},
                        () = token.cancelled() => return Err(DriverError::SessionClosed),
                    }
                }
                Err(error) => return Err(error),
            }
        }
    }
}
