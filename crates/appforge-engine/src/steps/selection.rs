use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{info, warn};

use appforge_config::RetryScope;
use appforge_state::{ErrorDetail, ErrorKind, ProjectState, StepResult};
use appforge_utils::types::Platform;

use super::{Step, StepContext};
use crate::extraction::parse_confirmation;
use crate::prompts;

/// Infers the target platform set: keyword rules plus a model confirmation.
pub struct SelectionStep;

const SCOPE: RetryScope = RetryScope::PlatformSelection;

/// Combine rule candidates with the model's confirmation.
///
/// Explicit mentions cannot be vetoed: an empty intersection falls back to
/// the candidates. Without candidates the confirmation decides, and without
/// either the configured fallback applies.
#[must_use]
pub fn select_platforms(
    candidates: &BTreeSet<Platform>,
    confirmed: &BTreeSet<Platform>,
    fallback: &[Platform],
) -> BTreeSet<Platform> {
    if !candidates.is_empty() {
        let both: BTreeSet<Platform> = candidates.intersection(confirmed).copied().collect();
        return if both.is_empty() {
            candidates.clone()
        } else {
            both
        };
    }
    if !confirmed.is_empty() {
        return confirmed.clone();
    }
    fallback.iter().copied().collect()
}

#[async_trait]
impl Step for SelectionStep {
    fn name(&self) -> &'static str {
        "platform_selection"
    }

    async fn execute(&self, state: &ProjectState, ctx: &StepContext) -> StepResult {
        let Some(requirements) = state.requirements.as_ref() else {
            return StepResult::fail(
                state.clone(),
                ErrorDetail::new(
                    ErrorKind::InvariantViolation,
                    "platform selection reached without requirements",
                )
                .in_step(SCOPE.as_str()),
            );
        };

        let mut candidates = Platform::mentioned_in(&state.request);
        candidates.extend(requirements.platform_hints.iter().copied());

        let messages = prompts::platform_selection(requirements, &candidates, ctx.note());
        let names: Vec<&str> = candidates.iter().map(Platform::as_str).collect();
        let raw = match ctx
            .services
            .complete(ctx, SCOPE, None, messages, vec![("candidates", json!(names))])
            .await
        {
            Ok(raw) => raw,
            Err(e) => return ctx.call_failed(state, SCOPE, e),
        };

        let confirmation = match parse_confirmation(&raw) {
            Ok(confirmation) => confirmation,
            Err(problem) => {
                return ctx.revise_or_fail(state, SCOPE, ErrorKind::RetryExhausted, problem);
            }
        };

        let workflow = &ctx.services.config.workflow;
        let selected = select_platforms(
            &candidates,
            &confirmation.platforms,
            &workflow.fallback_platforms,
        );
        if candidates.is_empty() && confirmation.platforms.is_empty() && !selected.is_empty() {
            warn!(fallback = ?selected, "No platform justified; using fallback platforms");
        }

        let mut next = state.clone();
        next.platforms.extend(selected);

        if next.platforms.is_empty() {
            return StepResult::fail(
                state.clone(),
                ErrorDetail::new(
                    ErrorKind::NoPlatforms,
                    "no target platform could be justified from the request",
                )
                .in_step(SCOPE.as_str()),
            );
        }
        if next.platforms.len() < workflow.min_platforms {
            return StepResult::fail(
                state.clone(),
                ErrorDetail::new(
                    ErrorKind::NoPlatforms,
                    format!(
                        "{} platform(s) selected, at least {} required",
                        next.platforms.len(),
                        workflow.min_platforms
                    ),
                )
                .in_step(SCOPE.as_str()),
            );
        }

        info!(
            platforms = ?next.platforms,
            rationale = %confirmation.rationale,
            "Selected platforms"
        );
        StepResult::continue_with(next)
    }
}
