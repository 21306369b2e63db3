// Caller-side retry for ledger operations that lost an optimistic-concurrency race.
//
// The ledger service never retries on its own; the boundary decides how many
// times a conflicting append is re-run from scratch.

use crate::errors::{Result, WalletError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 10,
            max_delay_ms: 200,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Run `operation` once, without retries
    pub fn disabled() -> Self {
        Self::new(RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        })
    }

    /// Exponential backoff with jitter for the nth retry
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay_ms as f64
            * self.config.backoff_multiplier.powi(attempt as i32);

        let capped_delay = base_delay.min(self.config.max_delay_ms as f64);

        // Spread concurrent losers of the same race apart
        let jitter_range = capped_delay * self.config.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    /// Re-run `operation` while it fails with `ConsistencyConflict`.
    ///
    /// Every other outcome, including infrastructure failures whose effect is
    /// unknown, is returned to the caller as is.
    pub async fn execute<F, Fut, T>(&self, operation: F, operation_name: &str) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            "Operation {} succeeded on retry attempt {}/{}",
                            operation_name, attempt, self.config.max_retries
                        );
                    }
                    return Ok(result);
                }
                Err(e @ WalletError::ConsistencyConflict(_)) if attempt < self.config.max_retries => {
                    let delay = self.calculate_delay(attempt);
                    attempt += 1;
                    warn!(
                        "Attempt {}/{} for {} lost a concurrent update ({}), retrying after {:?}",
                        attempt,
                        self.config.max_retries + 1,
                        operation_name,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter(max_retries: u32) -> RetryStrategy {
        RetryStrategy::new(RetryConfig {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 4,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        })
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let strategy = no_jitter(5);
        assert_eq!(strategy.calculate_delay(0).as_millis(), 1);
        assert_eq!(strategy.calculate_delay(1).as_millis(), 2);
        assert_eq!(strategy.calculate_delay(2).as_millis(), 4);
        assert_eq!(strategy.calculate_delay(6).as_millis(), 4);
    }

    #[tokio::test]
    async fn test_retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = no_jitter(3)
            .execute(
                move || async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(WalletError::ConsistencyConflict(1))
                    } else {
                        Ok("committed")
                    }
                },
                "append",
            )
            .await;

        assert_eq!(result, Ok("committed"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = no_jitter(2)
            .execute(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(WalletError::ConsistencyConflict(9))
                },
                "append",
            )
            .await;

        assert_eq!(result, Err(WalletError::ConsistencyConflict(9)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_and_unknown_outcomes_are_not_retried() {
        for error in [
            WalletError::DuplicateFingerprint("fp".to_string()),
            WalletError::Infrastructure { operation: "append_transaction" },
            WalletError::WalletNotFound(4),
        ] {
            let calls = AtomicU32::new(0);
            let counter = &calls;
            let failure = &error;
            let result: Result<()> = no_jitter(5)
                .execute(
                    move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(failure.clone())
                    },
                    "append",
                )
                .await;

            assert_eq!(result, Err(error));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_disabled_runs_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = RetryStrategy::disabled()
            .execute(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(WalletError::ConsistencyConflict(2))
                },
                "append",
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
