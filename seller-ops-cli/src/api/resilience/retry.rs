//! Bounded retry with exponential backoff and jitter

use anyhow::Result;
use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::api::HttpStatusError;
use crate::error::SyncError;

/// Retry timing
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, the first call included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each delay between half and the full computed value
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn conservative() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 1.5,
            jitter: true,
        }
    }
}

/// Transient failure kinds worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableError {
    /// HTTP 429 or a quota message
    RateLimited,
    /// HTTP 500, 502, 503 or 504
    ServerError(u16),
    Timeout,
    Connection,
}

impl RetryableError {
    /// Classify an error, `None` when retrying cannot help
    pub fn classify(err: &anyhow::Error) -> Option<Self> {
        for cause in err.chain() {
            if let Some(status) = cause.downcast_ref::<HttpStatusError>() {
                return Self::from_status(status.status);
            }
            if let Some(req) = cause.downcast_ref::<reqwest::Error>() {
                if let Some(status) = req.status() {
                    return Self::from_status(status.as_u16());
                }
                if req.is_timeout() {
                    return Some(RetryableError::Timeout);
                }
                if req.is_connect() {
                    return Some(RetryableError::Connection);
                }
            }
        }

        let message = format!("{:#}", err).to_lowercase();
        if message.contains("quota") || message.contains("rate limit") || message.contains("too many requests") {
            return Some(RetryableError::RateLimited);
        }
        None
    }

    /// The server refused the request without applying it
    pub fn is_rejection(self) -> bool {
        matches!(self, RetryableError::RateLimited)
    }

    fn from_status(status: u16) -> Option<Self> {
        match status {
            429 => Some(RetryableError::RateLimited),
            500 | 502 | 503 | 504 => Some(RetryableError::ServerError(status)),
            _ => None,
        }
    }
}

/// Runs an async operation under a [`RetryConfig`]
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before attempt `attempt + 1`, with `attempt` starting at 1
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let raw = self.config.base_delay.as_nanos() as f64 * self.config.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.config.max_delay.as_nanos() as f64);

        let nanos = if self.config.jitter && capped > 0.0 {
            capped * rand::rng().random_range(0.5..=1.0)
        } else {
            capped
        };
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Run `operation`, retrying transient failures.
    ///
    /// Exhausted retries are logged as a warning and returned with
    /// [`SyncError::RateLimited`] as the outermost context.
    pub async fn execute<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, f, |_| true).await
    }

    /// Run a non-idempotent `operation`.
    ///
    /// Only rejections (429, quota) are retried. A server error, timeout or
    /// dropped connection may follow a write that was already applied, so
    /// those surface after the first attempt.
    pub async fn execute_write<T, F, Fut>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run(operation, f, RetryableError::is_rejection).await
    }

    async fn run<T, F, Fut>(&self, operation: &str, mut f: F, retry_on: fn(RetryableError) -> bool) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let Some(kind) = RetryableError::classify(&err).filter(|k| retry_on(*k)) else {
                        return Err(err);
                    };

                    if attempt >= max_attempts {
                        warn!(
                            "{} still failing after {} attempt(s) ({:?}): {:#}",
                            operation, attempt, kind, err
                        );
                        return Err(err.context(SyncError::RateLimited {
                            operation: operation.to_string(),
                            attempts: attempt,
                        }));
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} hit {:?} (attempt {}/{}), retrying in {:?}",
                        operation, kind, attempt, max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 2.0,
            jitter: false,
        })
    }

    fn status(code: u16) -> anyhow::Error {
        HttpStatusError {
            operation: "test".into(),
            status: code,
            body: String::new(),
        }
        .into()
    }

    #[test]
    fn test_classify() {
        assert_eq!(RetryableError::classify(&status(429)), Some(RetryableError::RateLimited));
        assert_eq!(RetryableError::classify(&status(503)), Some(RetryableError::ServerError(503)));
        assert_eq!(RetryableError::classify(&status(400)), None);
        assert_eq!(RetryableError::classify(&status(404)), None);
        assert_eq!(
            RetryableError::classify(&anyhow::anyhow!("Quota exceeded for quota metric 'Write requests'")),
            Some(RetryableError::RateLimited)
        );
        assert_eq!(RetryableError::classify(&anyhow::anyhow!("bad range")), None);
    }

    #[test]
    fn test_classify_through_context() {
        let err = status(502).context("Failed to append rows");
        assert_eq!(RetryableError::classify(&err), Some(RetryableError::ServerError(502)));
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryConfig::default().max_attempts, 3);
        assert_eq!(RetryConfig::conservative().max_attempts, 2);

        let aggressive = RetryConfig::aggressive();
        assert_eq!(aggressive.max_attempts, 5);
        assert!(aggressive.max_delay < RetryConfig::default().max_delay);
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
            jitter: false,
        });
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for(6), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy::new(RetryConfig {
            jitter: true,
            ..RetryConfig::default()
        });
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(250) && delay <= Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = instant(3)
            .execute("append", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(status(429))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_rate_limited() {
        let calls = AtomicU32::new(0);
        let err = instant(2)
            .execute("append", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(status(429))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            err.downcast_ref::<SyncError>(),
            Some(&SyncError::RateLimited {
                operation: "append".into(),
                attempts: 2
            })
        );
    }

    #[tokio::test]
    async fn test_write_not_retried_on_server_error() {
        let calls = AtomicU32::new(0);
        let result = instant(3)
            .execute_write("values.append", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(status(503))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_retried_on_rate_limit() {
        let calls = AtomicU32::new(0);
        let result = instant(3)
            .execute_write("values.append", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow::anyhow!("Quota exceeded for quota metric 'Write requests'"))
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result = instant(5)
            .execute("read", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(status(400))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
