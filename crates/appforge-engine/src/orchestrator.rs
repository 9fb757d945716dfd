//! Workflow orchestrator
//!
//! Drives a [`ProjectState`] through the step graph until it reaches `Done`
//! or `Failed`. The dispatcher owns the per-status attempt counter and the
//! revision note; every step result goes through the [`ProjectStateStore`]
//! before it takes effect.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, warn};

use appforge_config::Config;
use appforge_llm::LlmRouter;
use appforge_state::{
    ErrorDetail, ErrorKind, ProjectState, ProjectStateStore, StepResult, StepSignal,
    WorkflowStatus,
};
use appforge_utils::error::AppForgeError;
use appforge_utils::logging::{log_step_complete, log_step_error, log_step_start, step_span};

use crate::cancel::CancelHandle;
use crate::steps::{
    ArchitectureStep, AssemblyStep, GenerationStep, PlanningStep, SelectionStep, Services, Step,
    StepContext,
};

/// Step executed in `status`, or `None` for terminal statuses.
fn step_for(status: WorkflowStatus) -> Option<&'static dyn Step> {
    match status {
        WorkflowStatus::Planning => Some(&PlanningStep),
        WorkflowStatus::SelectingPlatforms => Some(&SelectionStep),
        WorkflowStatus::DesigningArchitecture => Some(&ArchitectureStep),
        WorkflowStatus::Generating => Some(&GenerationStep),
        WorkflowStatus::Assembling => Some(&AssemblyStep),
        WorkflowStatus::Done | WorkflowStatus::Failed => None,
    }
}

/// Stable id for a run: BLAKE3 of the request and its start time.
#[must_use]
pub fn run_id_for(request: &str, started_at: DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(request.as_bytes());
    hasher.update(b"\0");
    hasher.update(started_at.to_rfc3339().as_bytes());
    hasher.finalize().to_hex()[..16].to_string()
}

/// Runs requests through the workflow graph.
///
/// `run` never returns an error: every failure ends as a `Failed` state
/// carrying an [`ErrorDetail`].
pub struct Orchestrator {
    services: Arc<Services>,
    store: ProjectStateStore,
}

impl Orchestrator {
    #[must_use]
    pub fn new(services: Services) -> Self {
        let store = ProjectStateStore::new(services.config.workflow.max_transitions);
        Self {
            services: Arc::new(services),
            store,
        }
    }

    /// Build the generation and retrieval clients described by `config`.
    pub fn from_config(config: Config) -> Result<Self, AppForgeError> {
        let llm = LlmRouter::from_config(&config)?;
        if let Some(fallback) = llm.fallback_info() {
            warn!(
                primary = %fallback.primary_provider,
                fallback = %fallback.fallback_provider,
                reason = %fallback.reason,
                "Using fallback LLM provider"
            );
        }
        let retrieval = appforge_retrieval::from_config(&config)?;
        Ok(Self::new(Services {
            config,
            llm,
            retrieval,
        }))
    }

    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    pub async fn run(&self, request: &str) -> ProjectState {
        self.run_with_cancel(request, CancelHandle::new()).await
    }

    /// Run `request` until a terminal status, honoring `cancel` between
    /// steps and during remote calls.
    pub async fn run_with_cancel(&self, request: &str, cancel: CancelHandle) -> ProjectState {
        let run_id = run_id_for(request, Utc::now());
        info!(run_id = %run_id, "Starting workflow");
        self.services.llm.reset_budget();
        self.drive(ProjectState::new(run_id, request), cancel).await
    }

    /// Re-plan a finished run with a follow-up request.
    ///
    /// The follow-up is appended to the original request and the graph
    /// restarts at `Planning`. This is the only path that may drop platforms
    /// or replace the plan and generated files.
    pub async fn refine(
        &self,
        state: ProjectState,
        follow_up: &str,
        cancel: CancelHandle,
    ) -> ProjectState {
        let mut next = state.clone();
        next.request = format!("{}\n\n{}", state.request.trim_end(), follow_up.trim());
        next.reset_for_replanning();

        let result = StepResult::new(next, StepSignal::Branch(WorkflowStatus::Planning));
        match self.store.apply(&state, result) {
            Ok(replanning) => {
                info!(run_id = %replanning.run_id, "Re-planning run");
                self.services.llm.reset_budget();
                self.drive(replanning, cancel).await
            }
            Err(violation) => self.store.abort(
                &state,
                ErrorDetail::new(ErrorKind::InvariantViolation, violation.to_string()),
            ),
        }
    }

    async fn drive(&self, mut state: ProjectState, cancel: CancelHandle) -> ProjectState {
        let mut attempt = 1u32;
        let mut note: Option<String> = None;

        while let Some(step) = step_for(state.status) {
            let status = state.status;
            let span = step_span(&state.run_id, step.name(), attempt);
            let started = Instant::now();

            let result = if cancel.is_cancelled() {
                StepResult::fail(
                    state.clone(),
                    ErrorDetail::new(ErrorKind::Cancelled, "run cancelled by the driver")
                        .in_step(step.name()),
                )
            } else {
                let ctx = StepContext {
                    run_id: state.run_id.clone(),
                    services: self.services.clone(),
                    cancel: cancel.clone(),
                    attempt,
                    note: note.take(),
                };
                async {
                    log_step_start(step.name(), attempt);
                    step.execute(&state, &ctx).await
                }
                .instrument(span.clone())
                .await
            };

            let elapsed = started.elapsed().as_millis();
            let signal = result.signal.clone();
            let revision = result.note.clone();
            span.in_scope(|| match &signal {
                StepSignal::Fail(detail) => {
                    log_step_error(step.name(), detail.kind.as_str(), &detail.message, elapsed);
                }
                other => log_step_complete(step.name(), &other.label(), elapsed),
            });

            state = match self.store.apply(&state, result) {
                Ok(next) => next,
                Err(violation) => {
                    warn!(step = step.name(), error = %violation, "Rejected step result");
                    self.store.abort(
                        &state,
                        ErrorDetail::new(ErrorKind::InvariantViolation, violation.to_string())
                            .in_step(step.name()),
                    )
                }
            };

            if state.status == status {
                attempt += 1;
                note = revision;
            } else {
                attempt = 1;
                note = None;
            }
        }

        report(&state);
        state
    }
}

fn report(state: &ProjectState) {
    match (&state.error, state.partial_failure()) {
        (Some(error), _) => warn!(
            run_id = %state.run_id,
            kind = %error.kind,
            step = error.step.as_deref().unwrap_or("-"),
            error = %error.message,
            "Workflow failed"
        ),
        (None, Some(partial)) => warn!(
            run_id = %state.run_id,
            platforms = ?state.usable_platforms(),
            failed = %partial.message,
            "Workflow finished with failed platforms"
        ),
        (None, None) => info!(
            run_id = %state.run_id,
            platforms = ?state.usable_platforms(),
            transitions = state.history.len(),
            "Workflow finished"
        ),
    }
}
