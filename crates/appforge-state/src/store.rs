//! Project state store
//!
//! Applies a [`StepResult`] to the current state and returns the next state.
//! Every invariant is checked here; a violation is returned as
//! [`InvariantViolation`] and is never retried.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use appforge_utils::error::InvariantViolation;

use crate::types::{ErrorDetail, ProjectState, TransitionRecord, WorkflowStatus};

/// What the dispatcher should do after a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "detail", rename_all = "snake_case")]
pub enum StepSignal {
    /// Advance to the next status.
    Continue,
    /// Run the same step again on the returned state.
    Retry,
    /// Jump to another status. `Branch(Planning)` is the re-planning transition.
    Branch(WorkflowStatus),
    /// Settle to `Failed`.
    Fail(ErrorDetail),
}

impl StepSignal {
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Continue => "continue".to_string(),
            Self::Retry => "retry".to_string(),
            Self::Branch(target) => format!("branch({target})"),
            Self::Fail(detail) => format!("fail({})", detail.kind),
        }
    }

    const fn is_replanning(&self) -> bool {
        matches!(self, Self::Branch(WorkflowStatus::Planning))
    }
}

impl fmt::Display for StepSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Output of one workflow step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub state: ProjectState,
    pub signal: StepSignal,
    /// Feedback for the next attempt of a retried step.
    pub note: Option<String>,
}

impl StepResult {
    #[must_use]
    pub fn new(state: ProjectState, signal: StepSignal) -> Self {
        Self {
            state,
            signal,
            note: None,
        }
    }

    #[must_use]
    pub fn continue_with(state: ProjectState) -> Self {
        Self::new(state, StepSignal::Continue)
    }

    #[must_use]
    pub fn retry_with(state: ProjectState) -> Self {
        Self::new(state, StepSignal::Retry)
    }

    #[must_use]
    pub fn fail(state: ProjectState, detail: ErrorDetail) -> Self {
        Self::new(state, StepSignal::Fail(detail))
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Validates and applies transitions.
#[derive(Debug, Clone, Copy)]
pub struct ProjectStateStore {
    max_transitions: u32,
}

impl ProjectStateStore {
    #[must_use]
    pub const fn new(max_transitions: u32) -> Self {
        Self { max_transitions }
    }

    /// Apply `result` on top of `current`.
    ///
    /// Checks, in order: terminal states accept only re-planning; steps
    /// never set status or error themselves; the transition is legal; the
    /// transition limit holds; and, outside re-planning, the request is
    /// unchanged, platforms are never removed, the plan is never replaced,
    /// and files exist only for selected platforms the plan covers.
    pub fn apply(
        &self,
        current: &ProjectState,
        result: StepResult,
    ) -> Result<ProjectState, InvariantViolation> {
        let StepResult {
            state: mut next,
            signal,
            ..
        } = result;
        let from = current.status;

        if from.is_terminal() && !signal.is_replanning() {
            return Err(InvariantViolation::TerminalState {
                status: from.to_string(),
            });
        }
        if next.status != from {
            return Err(InvariantViolation::IllegalTransition {
                from: from.to_string(),
                to: next.status.to_string(),
            });
        }
        if next.error.is_some() {
            return Err(InvariantViolation::ErrorOnNonFailed {
                status: from.to_string(),
            });
        }

        let to = target_status(from, &signal)?;

        if current.history.len() >= self.max_transitions as usize {
            return Err(InvariantViolation::TransitionLimit {
                limit: self.max_transitions,
            });
        }

        if !signal.is_replanning() {
            check_preserved(current, &next)?;
        }
        check_outputs(&next)?;

        if let StepSignal::Fail(detail) = &signal {
            if detail.message.trim().is_empty() {
                return Err(InvariantViolation::MissingErrorDetail);
            }
            next.error = Some(detail.clone());
        }

        debug!(from = %from, to = %to, signal = %signal, "Applying transition");
        next.history.push(TransitionRecord {
            from,
            to,
            signal: signal.label(),
            at: Utc::now(),
        });
        next.status = to;
        Ok(next)
    }

    /// Settle `current` to `Failed` without validating a step result.
    ///
    /// Used when a transition was rejected; the returned state is the last
    /// valid state plus the failure. A terminal state is returned unchanged.
    #[must_use]
    pub fn abort(&self, current: &ProjectState, detail: ErrorDetail) -> ProjectState {
        if current.is_terminal() {
            return current.clone();
        }
        let mut next = current.clone();
        next.history.push(TransitionRecord {
            from: current.status,
            to: WorkflowStatus::Failed,
            signal: format!("abort({})", detail.kind),
            at: Utc::now(),
        });
        next.status = WorkflowStatus::Failed;
        next.error = Some(detail);
        next
    }
}

fn target_status(
    from: WorkflowStatus,
    signal: &StepSignal,
) -> Result<WorkflowStatus, InvariantViolation> {
    let illegal = |to: WorkflowStatus| InvariantViolation::IllegalTransition {
        from: from.to_string(),
        to: to.to_string(),
    };
    match signal {
        StepSignal::Continue => from.next().ok_or_else(|| illegal(from)),
        StepSignal::Retry => Ok(from),
        StepSignal::Fail(_) => Ok(WorkflowStatus::Failed),
        StepSignal::Branch(WorkflowStatus::Planning) => Ok(WorkflowStatus::Planning),
        // Other branches may only revisit an earlier non-terminal status.
        StepSignal::Branch(target) if !target.is_terminal() && *target <= from => Ok(*target),
        StepSignal::Branch(target) => Err(illegal(*target)),
    }
}

fn check_preserved(current: &ProjectState, next: &ProjectState) -> Result<(), InvariantViolation> {
    if next.request != current.request || next.run_id != current.run_id {
        return Err(InvariantViolation::RequestChanged);
    }
    if let Some(removed) = current.platforms.difference(&next.platforms).next() {
        return Err(InvariantViolation::PlatformRemoved {
            platform: removed.to_string(),
        });
    }
    if current.plan.is_some() && next.plan != current.plan {
        return Err(InvariantViolation::PlanReplaced);
    }
    if next.history != current.history {
        return Err(InvariantViolation::IllegalTransition {
            from: current.status.to_string(),
            to: "rewritten history".to_string(),
        });
    }
    Ok(())
}

fn check_outputs(next: &ProjectState) -> Result<(), InvariantViolation> {
    let populated = next
        .files
        .iter()
        .filter(|(_, tree)| !tree.is_empty())
        .map(|(p, _)| *p)
        .chain(next.outcomes.keys().copied());

    for platform in populated {
        if !next.platforms.contains(&platform) {
            return Err(InvariantViolation::UnselectedPlatform {
                platform: platform.to_string(),
            });
        }
        if next.files.get(&platform).is_some_and(|t| !t.is_empty())
            && !next.plan.as_ref().is_some_and(|plan| plan.covers(platform))
        {
            return Err(InvariantViolation::FilesBeforePlan {
                platform: platform.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArchitecturePlan, Component, ErrorKind, FileTree};
    use appforge_utils::types::Platform;

    fn store() -> ProjectStateStore {
        ProjectStateStore::new(64)
    }

    fn advance(state: &ProjectState, signal: StepSignal) -> ProjectState {
        store()
            .apply(state, StepResult::new(state.clone(), signal))
            .unwrap()
    }

    fn plan_for(platform: Platform) -> ArchitecturePlan {
        ArchitecturePlan {
            components: vec![Component {
                name: format!("{platform}-app"),
                platform: Some(platform),
                responsibility: String::new(),
                files: vec![platform.entry_point().to_string()],
            }],
            ..ArchitecturePlan::default()
        }
    }

    fn tree(path: &str) -> FileTree {
        FileTree::from([(path.to_string(), "x".to_string())])
    }

    #[test]
    fn test_continue_walks_the_graph_and_records_history() {
        let mut state = ProjectState::new("run", "todo app");
        for _ in 0..5 {
            state = advance(&state, StepSignal::Continue);
        }
        assert_eq!(state.status, WorkflowStatus::Done);
        assert_eq!(state.history.len(), 5);
        assert_eq!(state.history[0].from, WorkflowStatus::Planning);
        assert_eq!(state.history[4].to, WorkflowStatus::Done);
        assert_eq!(state.history[0].signal, "continue");
    }

    #[test]
    fn test_terminal_state_rejects_continue() {
        let state = advance(
            &ProjectState::new("run", ""),
            StepSignal::Fail(ErrorDetail::new(ErrorKind::UserInputUnactionable, "empty")),
        );
        assert_eq!(state.status, WorkflowStatus::Failed);
        assert_eq!(state.error.as_ref().unwrap().kind, ErrorKind::UserInputUnactionable);

        let err = store()
            .apply(&state, StepResult::continue_with(state.clone()))
            .unwrap_err();
        assert!(matches!(err, InvariantViolation::TerminalState { .. }));
    }

    #[test]
    fn test_platform_removal_is_rejected() {
        let mut current = ProjectState::new("run", "web and mobile");
        current.status = WorkflowStatus::DesigningArchitecture;
        current.platforms.insert(Platform::Web);
        current.platforms.insert(Platform::Mobile);

        let mut next = current.clone();
        next.platforms.remove(&Platform::Mobile);
        let err = store()
            .apply(&current, StepResult::continue_with(next))
            .unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::PlatformRemoved {
                platform: "mobile".into()
            }
        );
    }

    #[test]
    fn test_replanning_may_shrink_platforms() {
        let mut current = ProjectState::new("run", "web and mobile");
        current.status = WorkflowStatus::Done;
        current.platforms.insert(Platform::Mobile);
        current.plan = Some(plan_for(Platform::Mobile));

        let mut next = current.clone();
        next.request.push_str("\nweb only");
        next.reset_for_replanning();
        next.status = WorkflowStatus::Done;
        let applied = store()
            .apply(
                &current,
                StepResult::new(next, StepSignal::Branch(WorkflowStatus::Planning)),
            )
            .unwrap();
        assert_eq!(applied.status, WorkflowStatus::Planning);
        assert!(applied.platforms.is_empty());
        assert!(applied.plan.is_none());
    }

    #[test]
    fn test_files_before_plan_are_rejected() {
        let mut current = ProjectState::new("run", "web app");
        current.status = WorkflowStatus::Generating;
        current.platforms.insert(Platform::Web);

        let mut next = current.clone();
        next.files.insert(Platform::Web, tree("src/index.js"));
        let err = store()
            .apply(&current, StepResult::continue_with(next))
            .unwrap_err();
        assert!(matches!(err, InvariantViolation::FilesBeforePlan { .. }));
    }

    #[test]
    fn test_files_for_unselected_platform_are_rejected() {
        let mut current = ProjectState::new("run", "web app");
        current.status = WorkflowStatus::Generating;
        current.platforms.insert(Platform::Web);
        current.plan = Some(plan_for(Platform::Web));

        let mut next = current.clone();
        next.files.insert(Platform::Server, tree("server.js"));
        let err = store()
            .apply(&current, StepResult::continue_with(next))
            .unwrap_err();
        assert!(matches!(err, InvariantViolation::UnselectedPlatform { .. }));
    }

    #[test]
    fn test_plan_replacement_is_rejected() {
        let mut current = ProjectState::new("run", "web app");
        current.status = WorkflowStatus::Generating;
        current.platforms.insert(Platform::Web);
        current.plan = Some(plan_for(Platform::Web));

        let mut next = current.clone();
        next.plan = Some(ArchitecturePlan::default());
        let err = store()
            .apply(&current, StepResult::continue_with(next))
            .unwrap_err();
        assert_eq!(err, InvariantViolation::PlanReplaced);
    }

    #[test]
    fn test_step_cannot_set_status_or_error() {
        let current = ProjectState::new("run", "web app");

        let mut next = current.clone();
        next.status = WorkflowStatus::Done;
        assert!(matches!(
            store().apply(&current, StepResult::continue_with(next)),
            Err(InvariantViolation::IllegalTransition { .. })
        ));

        let mut next = current.clone();
        next.error = Some(ErrorDetail::new(ErrorKind::Rejected, "no"));
        assert!(matches!(
            store().apply(&current, StepResult::continue_with(next)),
            Err(InvariantViolation::ErrorOnNonFailed { .. })
        ));
    }

    #[test]
    fn test_fail_requires_message() {
        let current = ProjectState::new("run", "web app");
        let err = store()
            .apply(
                &current,
                StepResult::fail(current.clone(), ErrorDetail::new(ErrorKind::Rejected, " ")),
            )
            .unwrap_err();
        assert_eq!(err, InvariantViolation::MissingErrorDetail);
    }

    #[test]
    fn test_forward_branch_is_illegal() {
        let current = ProjectState::new("run", "web app");
        let err = store()
            .apply(
                &current,
                StepResult::new(current.clone(), StepSignal::Branch(WorkflowStatus::Generating)),
            )
            .unwrap_err();
        assert!(matches!(err, InvariantViolation::IllegalTransition { .. }));
    }

    #[test]
    fn test_transition_limit() {
        let store = ProjectStateStore::new(2);
        let mut state = ProjectState::new("run", "web app");
        for _ in 0..2 {
            state = store
                .apply(&state, StepResult::retry_with(state.clone()))
                .unwrap();
        }
        assert_eq!(
            store
                .apply(&state, StepResult::retry_with(state.clone()))
                .unwrap_err(),
            InvariantViolation::TransitionLimit { limit: 2 }
        );
    }

    #[test]
    fn test_abort_settles_to_failed() {
        let current = ProjectState::new("run", "web app");
        let failed = store().abort(
            &current,
            ErrorDetail::new(ErrorKind::InvariantViolation, "plan replaced"),
        );
        assert_eq!(failed.status, WorkflowStatus::Failed);
        assert_eq!(failed.history.last().unwrap().signal, "abort(invariant_violation)");

        let again = store().abort(&failed, ErrorDetail::new(ErrorKind::Cancelled, "late"));
        assert_eq!(again, failed);
    }
}
