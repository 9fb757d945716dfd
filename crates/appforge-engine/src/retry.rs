//! Retry policy for remote calls
//!
//! Transient failures are retried with exponential backoff up to the step's
//! attempt bound. Every attempt runs under the per-call timeout and races the
//! run's cancellation handle. Non-transient failures return immediately so
//! the step can revise its prompt.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use appforge_config::{Config, RetryScope};
use appforge_utils::error::Classify;
use appforge_utils::logging::log_retry;
use appforge_utils::redaction::redact_error_message;

use crate::cancel::CancelHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries of one call, including the first.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn for_scope(config: &Config, scope: RetryScope) -> Self {
        Self {
            attempts: config.retries.for_scope(scope).transient_attempts,
            initial_backoff: config.workflow.initial_backoff(),
            max_backoff: config.workflow.max_backoff(),
            call_timeout: config.workflow.call_timeout(),
        }
    }

    /// Delay after the `attempt`-th failed try (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    Cancelled,
    /// Every attempt failed transiently or timed out.
    Exhausted { attempts: u32, message: String },
    /// The remote side refused; repeating the same request will not help.
    Rejected { message: String },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::Exhausted { attempts, message } => {
                write!(f, "gave up after {attempts} attempts: {message}")
            }
            Self::Rejected { message } => write!(f, "rejected: {message}"),
        }
    }
}

/// Run `call` until it succeeds, fails non-transiently, or attempts run out.
///
/// `call` receives the 1-based attempt number.
pub async fn call_with_retry<T, E, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    cancel: &CancelHandle,
    mut call: F,
) -> Result<T, CallError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return Err(CallError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(CallError::Cancelled),
            result = tokio::time::timeout(policy.call_timeout, call(attempt)) => result,
        };

        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !e.is_transient() => {
                return Err(CallError::Rejected {
                    message: redact_error_message(&e.to_string()),
                });
            }
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {:?}", policy.call_timeout),
        }

        if attempt < attempts {
            log_retry(operation, attempt, attempts, &last_error);
            let delay = policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => return Err(CallError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    Err(CallError::Exhausted {
        attempts,
        message: redact_error_message(&last_error),
    })
}
