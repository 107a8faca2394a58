//! Bounded retry with exponential backoff.
//!
//! Kafka metadata propagates asynchronously across the controller and
//! replicas: a write acknowledged by one broker may not be immediately
//! visible to a subsequent read. Every read-after-write in the reconcilers
//! goes through [`Retry::until`], which polls until the write is observable
//! or the budget is exhausted. [`Retry::run`] gives write RPCs the same
//! budget against transient broker errors (leader movement, throttling).
//!
//! The budget is attempts plus an optional wall-clock deadline. There is no
//! external cancellation token; dropping the future cancels the loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::{ErrorClass, ReconcileError, Result};

/// A reusable retry budget.
#[derive(Debug, Clone)]
pub struct Retry {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    deadline: Option<Duration>,
}

impl Default for Retry {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for Retry {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            deadline: config.timeout_ms.map(Duration::from_millis),
        }
    }
}

impl Retry {
    /// Set the maximum number of attempts (minimum 1).
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the first backoff interval. Doubles per attempt.
    #[must_use]
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the backoff cap.
    #[must_use]
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Set or clear the overall wall-clock deadline.
    #[must_use]
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Run `op`, retrying while it fails with a [`ErrorClass::Transient`]
    /// error. `NotFound` and `Fatal` errors short-circuit; on budget
    /// exhaustion the last transient error is returned unmodified.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let mut backoff = self.initial_backoff;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.class() == ErrorClass::Transient => {
                    if attempt >= self.max_attempts || self.deadline_passed(started) {
                        return Err(err);
                    }
                    debug!(attempt, backoff_ms = backoff.as_millis() as u64, error = %err, "retrying after transient error");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.max_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Poll `probe` until it reports the awaited state visible.
    ///
    /// `probe` returns `Ok(true)` when the write is observable, `Ok(false)`
    /// when it is not yet. Transient probe errors count as "not yet";
    /// anything else propagates. On exhaustion the call fails with
    /// [`ReconcileError::ConsistencyTimeout`] naming `operation`.
    pub async fn until<F, Fut>(&self, operation: &str, mut probe: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let started = Instant::now();
        let mut backoff = self.initial_backoff;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match probe().await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    debug!(attempt, operation, "write not yet observable");
                }
                Err(err) if err.class() == ErrorClass::Transient => {
                    debug!(attempt, operation, error = %err, "transient error while polling");
                }
                Err(err) => return Err(err),
            }
            if attempt >= self.max_attempts || self.deadline_passed(started) {
                return Err(ReconcileError::ConsistencyTimeout {
                    operation: operation.to_string(),
                    attempts: attempt,
                });
            }
            sleep(backoff).await;
            backoff = (backoff * 2).min(self.max_backoff);
        }
    }

    fn deadline_passed(&self, started: Instant) -> bool {
        self.deadline.is_some_and(|d| started.elapsed() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> Retry {
        Retry::default()
            .max_attempts(5)
            .initial_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(4))
            .deadline(Some(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_until_converges() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = fast()
            .until("test write", move || {
                let counter = Arc::clone(&counter);
                async move { Ok(counter.fetch_add(1, Ordering::SeqCst) + 1 >= 3) }
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_until_exhausts_budget() {
        let result = fast().until("test write", || async { Ok(false) }).await;
        match result {
            Err(ReconcileError::ConsistencyTimeout {
                operation,
                attempts,
            }) => {
                assert_eq!(operation, "test write");
                assert_eq!(attempts, 5);
            }
            other => panic!("expected ConsistencyTimeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_until_tolerates_transient_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = fast()
            .until("test write", move || {
                let counter = Arc::clone(&counter);
                async move {
                    match counter.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(ReconcileError::TransientBroker {
                            code: 5,
                            message: "LeaderNotAvailable".to_string(),
                        }),
                        n => Ok(n >= 2),
                    }
                }
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_until_propagates_fatal() {
        let result = fast()
            .until("test write", || async {
                Err(ReconcileError::FatalBroker {
                    code: 29,
                    message: "TopicAuthorizationFailed".to_string(),
                })
            })
            .await;
        assert!(matches!(result, Err(ReconcileError::FatalBroker { .. })));
    }

    #[tokio::test]
    async fn test_run_retries_transient_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = fast()
            .run(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ReconcileError::NoBrokersReachable)
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
    async fn test_run_does_not_retry_not_found() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<()> = fast()
            .run(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ReconcileError::TopicMissing("syslog".to_string()))
                }
            })
            .await;
        assert!(matches!(result, Err(ReconcileError::TopicMissing(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_returns_last_transient_on_exhaustion() {
        let result: Result<()> = fast()
            .run(|| async { Err(ReconcileError::NoBrokersReachable) })
            .await;
        assert!(matches!(result, Err(ReconcileError::NoBrokersReachable)));
    }
}
