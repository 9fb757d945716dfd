use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use appforge_config::RetryScope;
use appforge_state::{ErrorDetail, ErrorKind, ProjectState, Requirements, StepResult};

use super::{Step, StepContext};
use crate::extraction::parse_requirements;
use crate::prompts;

/// Parses the free-form request into structured requirements.
pub struct PlanningStep;

const SCOPE: RetryScope = RetryScope::Planning;

#[async_trait]
impl Step for PlanningStep {
    fn name(&self) -> &'static str {
        "planning"
    }

    async fn execute(&self, state: &ProjectState, ctx: &StepContext) -> StepResult {
        let request = state.request.trim();
        if !request.chars().any(char::is_alphanumeric) {
            return unactionable(state, "the request is empty");
        }

        let messages = prompts::planning(request, ctx.note());
        let raw = match ctx
            .services
            .complete(ctx, SCOPE, None, messages, vec![("request", json!(request))])
            .await
        {
            Ok(raw) => raw,
            Err(e) => return ctx.call_failed(state, SCOPE, e),
        };

        let extracted = match parse_requirements(&raw) {
            Ok(extracted) => extracted,
            Err(problem) => {
                return ctx.revise_or_fail(state, SCOPE, ErrorKind::RetryExhausted, problem);
            }
        };

        if !extracted.actionable {
            let reason = extracted
                .reason
                .unwrap_or_else(|| "no buildable application was described".to_string());
            return unactionable(state, &reason);
        }
        if extracted.features.is_empty() && extracted.summary.is_empty() {
            return unactionable(state, "no requirements could be extracted");
        }

        info!(
            features = extracted.features.len(),
            hinted_platforms = extracted.platforms.len(),
            "Extracted requirements"
        );

        let mut next = state.clone();
        next.requirements = Some(Requirements {
            summary: extracted.summary,
            features: extracted.features,
            platform_hints: extracted.platforms,
            constraints: extracted.constraints,
        });
        StepResult::continue_with(next)
    }
}

fn unactionable(state: &ProjectState, reason: &str) -> StepResult {
    StepResult::fail(
        state.clone(),
        ErrorDetail::new(ErrorKind::UserInputUnactionable, reason).in_step(SCOPE.as_str()),
    )
}
