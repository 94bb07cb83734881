/// Exponential backoff for transport-level retries against the provider
/// Provider faults are answers and are never retried here.

use crate::error::{FaultKind, ServiceError};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

/// Exponential backoff state tracker
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_interval_ms: u64,
    max_interval_ms: u64,
    current_attempt: u32,
    current_interval_ms: u64,
}

impl ExponentialBackoff {
    pub fn new(base_interval_ms: u64, max_interval_ms: u64) -> Self {
        ExponentialBackoff {
            base_interval_ms,
            max_interval_ms,
            current_attempt: 0,
            current_interval_ms: base_interval_ms,
        }
    }

    /// Record a failure and return the backoff duration
    pub fn on_failure(&mut self, error_message: &str) -> Duration {
        self.current_attempt += 1;

        // base * 2^(attempts - 1)
        let next_interval = self
            .base_interval_ms
            .saturating_mul(2_u64.saturating_pow(self.current_attempt.saturating_sub(1)));

        self.current_interval_ms = next_interval.min(self.max_interval_ms);

        warn!(
            attempt = self.current_attempt,
            interval_ms = self.current_interval_ms,
            error = error_message,
            "Transport failure: backing off before retry"
        );

        Duration::from_millis(self.current_interval_ms)
    }

    /// Reset backoff on successful operation
    pub fn on_success(&mut self) {
        if self.current_attempt > 0 {
            info!(
                attempts = self.current_attempt,
                "Provider reachable again after {} attempts, resetting backoff",
                self.current_attempt
            );
        }
        self.current_attempt = 0;
        self.current_interval_ms = self.base_interval_ms;
    }

    pub fn attempts(&self) -> u32 {
        self.current_attempt
    }

    pub fn interval_ms(&self) -> u64 {
        self.current_interval_ms
    }

    pub fn should_give_up(&self, max_retries: u32) -> bool {
        self.current_attempt > max_retries
    }
}

/// Run `operation`, retrying transport faults up to `max_retries` times
pub async fn execute_with_backoff<F, T, Fut>(
    mut backoff: ExponentialBackoff,
    max_retries: u32,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    loop {
        match operation().await {
            Ok(result) => {
                backoff.on_success();
                return Ok(result);
            }
            Err(err) if err.kind() == FaultKind::Transport => {
                let wait_duration = backoff.on_failure(&err.message);

                if backoff.should_give_up(max_retries) {
                    error!(
                        attempts = backoff.attempts(),
                        error = %err,
                        "Giving up after {} attempts",
                        backoff.attempts()
                    );
                    return Err(ServiceError::transport(format!(
                        "failed after {} attempts: {}",
                        backoff.attempts(),
                        err.message
                    )));
                }

                tokio::time::sleep(wait_duration).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff_initialization() {
        let backoff = ExponentialBackoff::new(100, 5_000);
        assert_eq!(backoff.base_interval_ms, 100);
        assert_eq!(backoff.max_interval_ms, 5_000);
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.interval_ms(), 100);
    }

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(100, 10_000);

        assert_eq!(backoff.on_failure("e1").as_millis(), 100);
        assert_eq!(backoff.on_failure("e2").as_millis(), 200);
        assert_eq!(backoff.on_failure("e3").as_millis(), 400);
        assert_eq!(backoff.on_failure("e4").as_millis(), 800);
    }

    #[test]
    fn test_backoff_capped_and_reset() {
        let mut backoff = ExponentialBackoff::new(100, 1_000);
        for _ in 0..10 {
            backoff.on_failure("test");
        }
        assert_eq!(backoff.interval_ms(), 1_000);

        backoff.on_success();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.interval_ms(), 100);
    }

    #[tokio::test]
    async fn test_transport_fault_retried_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = execute_with_backoff(ExponentialBackoff::new(1, 5), 3, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ServiceError::transport("connection refused"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transport_fault_gives_up() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = execute_with_backoff(ExponentialBackoff::new(1, 5), 2, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::transport("timeout"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), FaultKind::Transport);
        // first try plus two retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_provider_fault_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = execute_with_backoff(ExponentialBackoff::new(1, 5), 5, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::load_balancer_not_found("api-lb"))
            }
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
