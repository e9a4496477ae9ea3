use std::future::Future;
use std::time::Duration;

use super::types::ApiProbeError;
use tracing::warn;

/// Retry configuration for transient probe failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryConfig {
    /// Exponential backoff `base * 2^attempt` plus up to one `base` of random
    /// jitter, capped at `max_delay`. `attempt` is 0-indexed.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exp = base_ms * 2.0_f64.powi(attempt.min(16) as i32);
        let jitter = rand::random::<f64>() * base_ms;
        let ms = (exp + jitter).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Execute an async operation with retry logic.
///
/// Retries only if the error is classified as retryable and we haven't
/// exceeded max_retries. Returns the final error together with the number of
/// attempts made.
pub async fn with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut factory: F,
) -> Result<T, (ApiProbeError, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiProbeError>>,
{
    let max_attempts = config.max_retries + 1;

    for attempt in 0..max_attempts {
        match factory().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let classification = e.classify();

                if !classification.retryable || attempt + 1 >= max_attempts {
                    if classification.retryable {
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            max = max_attempts,
                            "Max retries exhausted"
                        );
                    }
                    return Err((e, attempt + 1));
                }

                let delay = config.retry_delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = max_attempts,
                    error_type = classification.error_type,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after transient error"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }

    Err((ApiProbeError::Internal("Retry loop exited unexpectedly".into()), max_attempts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_retry_delay_exponential_and_capped() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
        };
        let d0 = config.retry_delay(0).as_millis();
        let d1 = config.retry_delay(1).as_millis();
        assert!((100..=200).contains(&d0));
        assert!((200..=300).contains(&d1));
        assert_eq!(config.retry_delay(10), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_first_try() {
        let result = with_retry("test", &fast_config(3), || async {
            Ok::<_, ApiProbeError>(42)
        }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_retry_non_retryable_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry("test", &fast_config(3), || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ApiProbeError::ProbeTimeout("slow".into()))
            }
        }).await;

        let (_, made) = result.unwrap_err();
        assert_eq!(made, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_bound() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry("test", &fast_config(2), || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ApiProbeError::ProbeNetwork("connection reset".into()))
            }
        }).await;

        let (err, made) = result.unwrap_err();
        assert!(matches!(err, ApiProbeError::ProbeNetwork(_)));
        assert_eq!(made, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_after_transient_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = with_retry("test", &fast_config(2), || {
            let attempts = attempts_clone.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ApiProbeError::ProbeNetwork("dns failure".into()))
                } else {
                    Ok("ok")
                }
            }
        }).await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
