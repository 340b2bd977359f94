//! Retry manager with exponential backoff
//!
//! Only used for tools that declare themselves retry-safe. Other tools get
//! exactly one attempt.
//! - Strategy: binary exponential with ±25% jitter
//! - Delay cap: 16s per attempt

use crate::errors::StepError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Default number of attempts for retry-safe tools
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff
const BASE_DELAY_MS: u64 = 100;

/// Maximum delay cap (16 seconds)
const MAX_DELAY_MS: u64 = 16000;

/// Retry manager with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryManager {
    /// Maximum attempts, including the first one
    max_attempts: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Enable jitter
    enable_jitter: bool,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryManager {
    /// Create new retry manager with default settings
    pub fn new() -> Self {
        Self::with_config(DEFAULT_MAX_ATTEMPTS, BASE_DELAY_MS)
    }

    /// Create retry manager with custom settings
    pub fn with_config(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS,
            enable_jitter: true,
        }
    }

    /// Execute operation, retrying retryable failures when `retry_safe`
    ///
    /// The last failure is returned unchanged once attempts are exhausted.
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        retry_safe: bool,
        mut operation: F,
    ) -> Result<T, StepError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StepError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;

                    if !e.is_retryable(retry_safe) || attempt >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.calculate_delay(attempt);
                    debug!(tool = e.tool(), attempt, delay_ms = delay.as_millis() as u64, "retrying step");
                    sleep(delay).await;
                }
            }
        }
    }

    /// Calculate delay for given attempt number
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));

        let delay_ms = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Get max attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ToolError;
    use crate::security::Action;
    use std::sync::{Arc, Mutex};

    fn tool_failure() -> StepError {
        StepError::ToolFailed {
            tool: "flaky".to_string(),
            source: ToolError::Failed("transient".to_string()),
        }
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let retry_manager = RetryManager::with_config(3, 1);

        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(true, move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Ok::<i32, StepError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let retry_manager = RetryManager::with_config(3, 1);

        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(true, move || {
                let count = count_clone.clone();
                async move {
                    let mut attempts = count.lock().unwrap();
                    *attempts += 1;
                    let current = *attempts;
                    drop(attempts);

                    if current < 3 {
                        Err(tool_failure())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt_count.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_max_attempts_returns_last_error() {
        let retry_manager = RetryManager::with_config(3, 1);

        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(true, move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Err::<i32, _>(tool_failure())
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), tool_failure());
        assert_eq!(*attempt_count.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_no_retry_without_retry_safe() {
        let retry_manager = RetryManager::with_config(5, 1);

        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(false, move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Err::<i32, _>(tool_failure())
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_retryable_error() {
        let retry_manager = RetryManager::with_config(5, 1);

        let attempt_count = Arc::new(Mutex::new(0));
        let count_clone = attempt_count.clone();

        let result = retry_manager
            .execute_with_retry(true, move || {
                let count = count_clone.clone();
                async move {
                    *count.lock().unwrap() += 1;
                    Err::<i32, _>(StepError::PermissionDenied {
                        tool: "flaky".to_string(),
                        action: Action::Execute,
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[test]
    fn test_calculate_delay() {
        let retry_manager = RetryManager {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 16000,
            enable_jitter: false,
        };

        assert_eq!(retry_manager.calculate_delay(0), Duration::from_millis(1000));
        assert_eq!(retry_manager.calculate_delay(1), Duration::from_millis(2000));
        assert_eq!(retry_manager.calculate_delay(3), Duration::from_millis(8000));
        assert_eq!(retry_manager.calculate_delay(10), Duration::from_millis(16000));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryManager::with_config(0, 10).max_attempts(), 1);
    }
}
