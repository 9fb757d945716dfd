//! Workflow steps
//!
//! A step is a function of the current [`ProjectState`] and a
//! [`StepContext`] that returns a [`StepResult`]. Steps never mutate shared
//! state and never raise: remote failures are handled inside the step and
//! only an exhausted budget escalates to a `Fail` signal.

mod architecture;
mod assembly;
mod generation;
mod planning;
mod selection;

pub use architecture::ArchitectureStep;
pub use assembly::AssemblyStep;
pub use generation::GenerationStep;
pub use planning::PlanningStep;
pub use selection::SelectionStep;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use appforge_config::{Config, RetryScope};
use appforge_llm::{LlmInvocation, LlmRouter, Message};
use appforge_retrieval::{RetrievalClient, SnippetRef};
use appforge_state::{ErrorDetail, ErrorKind, ProjectState, StepResult};
use appforge_utils::types::Platform;
use tracing::warn;

use crate::cancel::CancelHandle;
use crate::retry::{CallError, RetryPolicy, call_with_retry};

/// Collaborators shared by every step of a run.
pub struct Services {
    pub config: Config,
    pub llm: LlmRouter,
    pub retrieval: Arc<dyn RetrievalClient>,
}

impl Services {
    #[must_use]
    pub fn policy(&self, scope: RetryScope) -> RetryPolicy {
        RetryPolicy::for_scope(&self.config, scope)
    }

    /// Allowed tries of a step, counting revisions.
    #[must_use]
    pub fn step_attempts(&self, scope: RetryScope) -> u32 {
        1 + self.config.retries.for_scope(scope).revision_attempts
    }

    /// Call the Generation Client for `scope` with transient retries.
    pub async fn complete(
        &self,
        ctx: &StepContext,
        scope: RetryScope,
        platform: Option<Platform>,
        messages: Vec<Message>,
        metadata: Vec<(&str, Value)>,
    ) -> Result<String, CallError> {
        let route = self.llm.route(scope);
        let policy = self.policy(scope);
        let operation = match platform {
            Some(p) => format!("{scope}:{p}"),
            None => scope.to_string(),
        };

        let result = call_with_retry(&operation, &policy, &ctx.cancel, |_attempt| {
            let mut inv = LlmInvocation::new(
                ctx.run_id.clone(),
                scope.as_str(),
                route.model.clone(),
                policy.call_timeout,
                messages.clone(),
            );
            inv.platform = platform;
            for (key, value) in &metadata {
                inv = inv.with_metadata(*key, value.clone());
            }
            let backend = route.backend.clone();
            async move { backend.invoke(inv).await }
        })
        .await?;
        Ok(result.raw_response)
    }

    /// Search documentation. Any failure degrades to an empty context.
    pub async fn search_docs(
        &self,
        ctx: &StepContext,
        scope: RetryScope,
        query: &str,
        platform: Platform,
    ) -> Result<Vec<SnippetRef>, CallError> {
        let policy = self.policy(scope);
        let top_k = self.config.workflow.top_k;
        let operation = format!("retrieval:{platform}");
        let result = call_with_retry(&operation, &policy, &ctx.cancel, |_attempt| {
            let retrieval = self.retrieval.clone();
            let query = query.to_string();
            async move { retrieval.search(&query, platform, top_k).await }
        })
        .await;

        match result {
            Ok(snippets) => Ok(snippets),
            Err(CallError::Cancelled) => Err(CallError::Cancelled),
            Err(e) => {
                warn!(
                    platform = %platform,
                    error = %e,
                    "Documentation retrieval failed; continuing without documentation"
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Per-invocation context handed to a step by the dispatcher.
#[derive(Clone)]
pub struct StepContext {
    pub run_id: String,
    pub services: Arc<Services>,
    pub cancel: CancelHandle,
    /// 1-based attempt of this step in its current status.
    pub attempt: u32,
    /// Why the previous attempt was retried.
    pub note: Option<String>,
}

impl StepContext {
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Retry with a revision note while revisions remain, otherwise fail.
    #[must_use]
    pub fn revise_or_fail(
        &self,
        state: &ProjectState,
        scope: RetryScope,
        kind: ErrorKind,
        problem: String,
    ) -> StepResult {
        if self.attempt < self.services.step_attempts(scope) {
            warn!(step = %scope, attempt = self.attempt, problem = %problem, "Revising prompt");
            StepResult::retry_with(state.clone()).with_note(problem)
        } else {
            StepResult::fail(
                state.clone(),
                ErrorDetail::new(kind, problem).in_step(scope.as_str()),
            )
        }
    }

    /// Translate a failed remote call into the step's result.
    #[must_use]
    pub fn call_failed(
        &self,
        state: &ProjectState,
        scope: RetryScope,
        error: CallError,
    ) -> StepResult {
        match error {
            CallError::Cancelled => cancelled(state, scope),
            CallError::Exhausted { .. } => StepResult::fail(
                state.clone(),
                ErrorDetail::new(ErrorKind::RetryExhausted, error.to_string())
                    .in_step(scope.as_str()),
            ),
            CallError::Rejected { message } => {
                self.revise_or_fail(state, scope, ErrorKind::Rejected, message)
            }
        }
    }
}

/// Result for a step interrupted by cancellation.
#[must_use]
pub fn cancelled(state: &ProjectState, scope: RetryScope) -> StepResult {
    StepResult::fail(
        state.clone(),
        ErrorDetail::new(ErrorKind::Cancelled, "run cancelled by the driver").in_step(scope.as_str()),
    )
}

/// One node of the workflow graph.
#[async_trait]
pub trait Step: Send + Sync {
    /// Step name used in logs and error details.
    fn name(&self) -> &'static str;

    async fn execute(&self, state: &ProjectState, ctx: &StepContext) -> StepResult;
}
