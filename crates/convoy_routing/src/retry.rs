use std::{fmt::Display, future::Future, time::Duration};

use thiserror::Error;
use tracing::{debug, warn};

/// A single attempt exceeded `RetryPolicy::attempt_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("timed out after {0:?}")]
pub struct AttemptTimedOut(pub Duration);

enum AttemptFailure<E> {
    Failed(E),
    TimedOut(AttemptTimedOut),
}

/// Bounded retry with exponential backoff, shared by every external call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(4),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Option<T>,
    pub failed: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl<T> RetryOutcome<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self.result {
            Some(value) => Ok(value),
            None => Err(self
                .last_error
                .unwrap_or_else(|| String::from("no attempt was made"))),
        }
    }
}

impl RetryPolicy {
    /// Backoff to wait after the given failed attempt (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let backoff = self.initial_backoff.as_secs_f64() * factor;

        if !backoff.is_finite() || backoff >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(backoff)
        }
    }

    /// Runs `operation` until it succeeds or the attempt budget is spent.
    ///
    /// Never returns an error: failures are reported through the outcome.
    pub async fn run<T, E, F, Fut>(&self, label: &str, operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let (result, attempts) = self.attempts(label, operation, |_| true).await;

        match result {
            Ok(value) => RetryOutcome {
                result: Some(value),
                failed: false,
                attempts,
                last_error: None,
            },
            Err(failure) => RetryOutcome {
                result: None,
                failed: true,
                attempts,
                last_error: Some(match failure {
                    AttemptFailure::Failed(error) => error.to_string(),
                    AttemptFailure::TimedOut(timed_out) => timed_out.to_string(),
                }),
            },
        }
    }

    /// Same budget as [`RetryPolicy::run`], keeping the caller's error type.
    ///
    /// Errors rejected by `is_retryable` are returned after the attempt that
    /// produced them; timeouts are always retried.
    pub async fn call<T, E, F, Fut, R>(
        &self,
        label: &str,
        operation: F,
        is_retryable: R,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display + From<AttemptTimedOut>,
        R: Fn(&E) -> bool,
    {
        match self.attempts(label, operation, is_retryable).await.0 {
            Ok(value) => Ok(value),
            Err(AttemptFailure::Failed(error)) => Err(error),
            Err(AttemptFailure::TimedOut(timed_out)) => Err(E::from(timed_out)),
        }
    }

    async fn attempts<T, E, F, Fut, R>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: R,
    ) -> (Result<T, AttemptFailure<E>>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        R: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let failure = match tokio::time::timeout(self.attempt_timeout, operation()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!("{}: succeeded after {} attempts", label, attempt);
                    }
                    return (Ok(value), attempt);
                }
                Ok(Err(error)) => {
                    debug!("{}: attempt {}/{} failed: {}", label, attempt, max_attempts, error);
                    if !is_retryable(&error) {
                        return (Err(AttemptFailure::Failed(error)), attempt);
                    }
                    AttemptFailure::Failed(error)
                }
                Err(_) => {
                    debug!(
                        "{}: attempt {}/{} timed out after {:?}",
                        label, attempt, max_attempts, self.attempt_timeout
                    );
                    AttemptFailure::TimedOut(AttemptTimedOut(self.attempt_timeout))
                }
            };

            if attempt >= max_attempts {
                let reason = match &failure {
                    AttemptFailure::Failed(error) => error.to_string(),
                    AttemptFailure::TimedOut(timed_out) => timed_out.to_string(),
                };
                warn!("{}: giving up after {} attempts ({})", label, attempt, reason);
                return (Err(failure), attempt);
            }

            tokio::time::sleep(self.backoff(attempt)).await;
            attempt += 1;
        }
    }
}
