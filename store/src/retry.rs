//! Exponential-backoff retry helper, shared by the store client and the
//! rotation controller's provisioning loop.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Backoff configuration for a retried async operation
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the initial one
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling on any single delay
    pub max_delay: Duration,
    /// Backoff multiplier applied per attempt
    pub multiplier: f64,
    /// Whether to randomize delays to avoid a thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Delay before the given zero-indexed retry attempt
    #[must_use]
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        let pow = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(pow);
        let delay = Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()));

        if self.jitter {
            Self::add_jitter(delay)
        } else {
            delay
        }
    }

    fn add_jitter(delay: Duration) -> Duration {
        let mut rng = rand::rng();
        let jitter_factor = rng.random_range(0.5..=1.0);
        Duration::from_secs_f64(delay.as_secs_f64() * jitter_factor)
    }
}

/// Runs a fallible async operation with exponential backoff, logging each
/// failed attempt with its attempt number and remaining retries.
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute `operation` up to `1 + max_retries` times.
    ///
    /// # Errors
    ///
    /// Returns the last error if every attempt fails.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation(attempt).await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    let remaining = self.config.max_retries - attempt;
                    if remaining == 0 {
                        last_error = Some(error);
                        break;
                    }
                    let delay = self.config.calculate_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        remaining, ?delay, %error, "attempt failed, retrying"
                    );
                    last_error = Some(error);
                    sleep(delay).await;
                }
            }
        }

        Err(last_error.expect("at least one attempt runs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_without_jitter() {
        let cfg = RetryConfig {
            max_retries: 4,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(cfg.calculate_delay(0), Duration::from_millis(2000));
        assert_eq!(cfg.calculate_delay(1), Duration::from_millis(4000));
        assert_eq!(cfg.calculate_delay(2), Duration::from_millis(8000));
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let cfg = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(cfg.calculate_delay(5), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn execute_retries_until_success() {
        let executor = RetryExecutor::new(RetryConfig {
            max_retries: 4,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 1.0,
            jitter: false,
        });

        let result: Result<u32, &str> = executor
            .execute(|attempt| async move {
                if attempt < 2 {
                    Err("not yet")
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn execute_exhausts_retries_and_returns_last_error() {
        let executor = RetryExecutor::new(RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 1.0,
            jitter: false,
        });

        let result: Result<u32, &str> = executor.execute(|_| async { Err("nope") }).await;
        assert_eq!(result, Err("nope"));
    }
}
