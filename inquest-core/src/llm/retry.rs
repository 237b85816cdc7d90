//! Retry Logic for Capability Calls
//!
//! Implements exponential backoff with jitter for transient failures, plus the
//! per-call timeout that every reasoning, search, and storage call runs under.

use std::future::Future;
use std::time::Duration;

use crate::error::{InquestError, Result};
use crate::tools::ToolError;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Builder: set max attempts
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder: set initial delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Builder: set max delay
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Builder: set backoff multiplier
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Builder: enable/disable jitter
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);

        let clamped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.add_jitter {
            // Add up to 25% jitter
            let jitter = clamped_delay * 0.25 * rand_jitter();
            clamped_delay + jitter
        } else {
            clamped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0)
fn rand_jitter() -> f64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static SEED: AtomicU64 = AtomicU64::new(0);

    // LCG parameters
    const A: u64 = 1103515245;
    const C: u64 = 12345;
    const M: u64 = 1 << 31;

    let seed = SEED.fetch_add(1, Ordering::Relaxed);
    let time_component = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let combined = seed.wrapping_add(time_component);
    let next = (A.wrapping_mul(combined).wrapping_add(C)) % M;

    (next as f64) / (M as f64)
}

/// Run `operation` until it succeeds, `retryable` rejects the error, or the
/// attempts in `config` are used up
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation: F,
    retryable: P,
) -> std::result::Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };
        attempt += 1;
        if !retryable(&e) || attempt >= config.max_attempts {
            return Err(e);
        }

        let delay = config.delay_for_attempt(attempt - 1);
        tracing::debug!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "Retrying after failure"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Timeout plus bounded retry, applied to every capability call
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Upper bound on a single attempt
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            retry: RetryConfig::default(),
        }
    }
}

impl CallPolicy {
    pub fn new(timeout: Duration, retry: RetryConfig) -> Self {
        Self { timeout, retry }
    }

    /// Run `operation` with the timeout applied to each attempt.
    ///
    /// Only retryable failures are retried. A timed-out attempt counts as a
    /// retryable [`ToolError`].
    pub async fn run<F, Fut, T>(&self, label: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.timeout;
        let operation = &operation;
        let result = with_retry_if(
            &self.retry,
            move || async move {
                match tokio::time::timeout(timeout, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(InquestError::ToolInvocation(ToolError::timeout(timeout))),
                }
            },
            InquestError::is_retryable,
        )
        .await;

        if let Err(ref e) = result {
            tracing::warn!(call = label, error = %e, "Capability call failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(timeout: Duration, attempts: usize) -> CallPolicy {
        CallPolicy::new(
            timeout,
            RetryConfig::default()
                .with_max_attempts(attempts)
                .with_initial_delay(Duration::from_millis(1))
                .with_jitter(false),
        )
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert!(config.add_jitter);
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::default().with_jitter(false);

        // Exponential backoff: 500ms, 1000ms, 2000ms
        assert_eq!(config.delay_for_attempt(0).as_millis(), 500);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 2000);
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::default()
            .with_jitter(false)
            .with_max_delay(Duration::from_secs(1));

        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_with_retry_eventual_success() {
        let attempts = AtomicUsize::new(0);
        let config = RetryConfig::default()
            .with_max_attempts(3)
            .with_initial_delay(Duration::from_millis(10));

        let result = with_retry_if(
            &config,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err("transient error")
                    } else {
                        Ok("success")
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_policy_does_not_retry_fatal_errors() {
        let attempts = AtomicUsize::new(0);
        let policy = fast_policy(Duration::from_secs(1), 3);

        let result: Result<()> = policy
            .run("test", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ToolError::new(ToolErrorKind::Validation, "bad").into()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_policy_retries_transient_errors() {
        let attempts = AtomicUsize::new(0);
        let policy = fast_policy(Duration::from_secs(1), 3);

        let result = policy
            .run("test", || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(ToolError::transient("blip").into())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_times_out_each_attempt() {
        let attempts = AtomicUsize::new(0);
        let policy = fast_policy(Duration::from_millis(50), 2);

        let result: Result<()> = policy
            .run("slow", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(())
                }
            })
            .await;

        match result {
            Err(InquestError::ToolInvocation(e)) => assert_eq!(e.kind, ToolErrorKind::Timeout),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
