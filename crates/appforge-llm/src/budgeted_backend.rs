//! Budgeted backend wrapper for call limiting
//!
//! Wraps any `LlmBackend` and enforces a cap on the number of invocations
//! per run. Several wrappers may share one counter so that a run routed to
//! different providers per step still has a single budget.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, warn};

use appforge_utils::error::LlmError;

use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// A wrapper around an `LlmBackend` that enforces a budget limit.
///
/// The budget tracks attempted calls, not successful requests: a failed
/// call still consumes its slot, so retry loops cannot bypass the limit.
pub struct BudgetedBackend {
    inner: Arc<dyn LlmBackend>,
    counter: Arc<AtomicU32>,
    limit: u32,
}

impl BudgetedBackend {
    pub fn new(inner: Arc<dyn LlmBackend>, limit: u32) -> Self {
        Self::sharing(inner, limit, Arc::new(AtomicU32::new(0)))
    }

    /// Wrap `inner` using an existing counter.
    pub fn sharing(inner: Arc<dyn LlmBackend>, limit: u32, counter: Arc<AtomicU32>) -> Self {
        debug!(limit = limit, "Creating BudgetedBackend");
        Self {
            inner,
            counter,
            limit,
        }
    }

    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[async_trait]
impl LlmBackend for BudgetedBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        // Count before calling so failures consume budget too.
        let current = self.counter.fetch_add(1, Ordering::SeqCst);

        if current >= self.limit {
            let attempted = current + 1;
            warn!(
                limit = self.limit,
                attempted = attempted,
                "Budget limit exceeded"
            );
            return Err(LlmError::BudgetExceeded {
                limit: self.limit,
                attempted,
            });
        }

        debug!(
            call_count = current + 1,
            limit = self.limit,
            step = %inv.step,
            "Budget check passed"
        );

        self.inner.invoke(inv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::time::Duration;

    struct MockSuccessBackend;

    #[async_trait]
    impl LlmBackend for MockSuccessBackend {
        async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            Ok(LlmResult::new("ok", "mock", "mock-model"))
        }
    }

    struct MockFailureBackend;

    #[async_trait]
    impl LlmBackend for MockFailureBackend {
        async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, LlmError> {
            Err(LlmError::Transport("mock failure".to_string()))
        }
    }

    fn invocation() -> LlmInvocation {
        LlmInvocation::new(
            "run",
            "generation",
            "m",
            Duration::from_secs(5),
            vec![Message::user("x")],
        )
    }

    #[tokio::test]
    async fn test_budget_allows_calls_under_limit_then_rejects() {
        let backend = BudgetedBackend::new(Arc::new(MockSuccessBackend), 2);

        assert!(backend.invoke(invocation()).await.is_ok());
        assert!(backend.invoke(invocation()).await.is_ok());
        match backend.invoke(invocation()).await {
            Err(LlmError::BudgetExceeded { limit, attempted }) => {
                assert_eq!(limit, 2);
                assert_eq!(attempted, 3);
            }
            other => panic!("expected BudgetExceeded, got {other:?}"),
        }
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failures_consume_budget() {
        let backend = BudgetedBackend::new(Arc::new(MockFailureBackend), 1);

        assert!(matches!(
            backend.invoke(invocation()).await,
            Err(LlmError::Transport(_))
        ));
        assert!(matches!(
            backend.invoke(invocation()).await,
            Err(LlmError::BudgetExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_shared_counter_spans_backends() {
        let counter = Arc::new(AtomicU32::new(0));
        let a = BudgetedBackend::sharing(Arc::new(MockSuccessBackend), 2, counter.clone());
        let b = BudgetedBackend::sharing(Arc::new(MockSuccessBackend), 2, counter);

        assert!(a.invoke(invocation()).await.is_ok());
        assert!(b.invoke(invocation()).await.is_ok());
        assert!(a.invoke(invocation()).await.is_err());
        assert_eq!(b.call_count(), 3);
        assert_eq!(b.limit(), 2);
    }
}
