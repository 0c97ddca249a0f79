//! Backoff for ledger reads
//!
//! Only errors where [`OracleError::is_transient`] holds are retried. Bet
//! submissions never go through here: a resubmitted bet could land twice.

use super::errors::OracleError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl RetryConfig {
    /// Wait before retry number `retry` (1-based), capped at `max_delay`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails permanently, or the retries run out
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, what: &str, mut op: F) -> Result<T, OracleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OracleError>>,
{
    let mut retry = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(err);
        }
        if retry >= config.max_retries {
            warn!("[Retry] {} still failing after {} attempts: {}", what, retry + 1, err);
            return Err(err);
        }

        retry += 1;
        let delay = config.delay_for(retry);
        debug!(
            "[Retry] {} hit {} (retry {}/{} in {}ms)",
            what,
            err,
            retry,
            config.max_retries,
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            multiplier: 2,
        }
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let config = fast();
        assert_eq!(config.delay_for(1), Duration::from_millis(5));
        assert_eq!(config.delay_for(2), Duration::from_millis(10));
        assert_eq!(config.delay_for(3), Duration::from_millis(20));
        assert_eq!(config.delay_for(10), Duration::from_millis(20));
        assert_eq!(config.delay_for(100), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_recovers_from_rate_limit() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let result = with_retry(&fast(), "balance", || {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(OracleError::RateLimited)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_network_errors_exhaust_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let result = with_retry(&fast(), "balance", || {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(OracleError::Network("reset".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(OracleError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_insufficient_funds_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let seen = calls.clone();

        let result = with_retry(&fast(), "balance", || {
            seen.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(OracleError::InsufficientFunds) }
        })
        .await;

        assert_eq!(result.unwrap_err(), OracleError::InsufficientFunds);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
