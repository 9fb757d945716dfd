use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{info, warn};

use appforge_config::RetryScope;
use appforge_retrieval::SnippetRef;
use appforge_state::{ErrorDetail, ErrorKind, ProjectState, StepResult};
use appforge_utils::types::Platform;

use super::{Step, StepContext, cancelled};
use crate::extraction::parse_plan;
use crate::prompts;
use crate::retry::CallError;

/// Retrieves documentation per platform, then asks for an architecture plan.
pub struct ArchitectureStep;

const SCOPE: RetryScope = RetryScope::Architecture;

#[async_trait]
impl Step for ArchitectureStep {
    fn name(&self) -> &'static str {
        "architecture"
    }

    async fn execute(&self, state: &ProjectState, ctx: &StepContext) -> StepResult {
        let Some(requirements) = state.requirements.as_ref() else {
            return StepResult::fail(
                state.clone(),
                ErrorDetail::new(
                    ErrorKind::InvariantViolation,
                    "architecture design reached without requirements",
                )
                .in_step(SCOPE.as_str()),
            );
        };

        let mut next = state.clone();

        // Retrieval completes for every platform before the plan is requested.
        // Documentation fetched by an earlier attempt is reused.
        for platform in &state.platforms {
            if next.docs.contains_key(platform) {
                continue;
            }
            let query = prompts::retrieval_query(requirements, *platform, &["architecture"]);
            match ctx.services.search_docs(ctx, SCOPE, &query, *platform).await {
                Ok(snippets) => {
                    next.docs.insert(*platform, snippets);
                }
                Err(CallError::Cancelled) => return cancelled(state, SCOPE),
                Err(_) => {
                    next.docs.insert(*platform, Vec::new());
                }
            }
        }

        let docs: Vec<&SnippetRef> = next.docs.values().flatten().collect();
        let messages = prompts::architecture(requirements, &state.platforms, &docs, ctx.note());
        let names: Vec<&str> = state.platforms.iter().map(Platform::as_str).collect();
        let raw = match ctx
            .services
            .complete(ctx, SCOPE, None, messages, vec![("platforms", json!(names))])
            .await
        {
            Ok(raw) => raw,
            Err(e) => return ctx.call_failed(&next, SCOPE, e),
        };

        let mut plan = match parse_plan(&raw) {
            Ok(plan) => plan,
            Err(problem) => {
                return ctx.revise_or_fail(&next, SCOPE, ErrorKind::RetryExhausted, problem);
            }
        };

        let problems = plan.problems(&state.platforms);
        if !problems.is_empty() {
            return ctx.revise_or_fail(
                &next,
                SCOPE,
                ErrorKind::RetryExhausted,
                format!("invalid architecture plan: {}", problems.join("; ")),
            );
        }

        let known: BTreeSet<&str> = docs.iter().map(|s| s.source.as_str()).collect();
        let before = plan.citations.len();
        plan.citations.retain(|c| known.contains(c.as_str()));
        if plan.citations.len() < before {
            warn!(
                dropped = before - plan.citations.len(),
                "Dropped citations that do not match retrieved documentation"
            );
        }

        info!(
            components = plan.components.len(),
            edges = plan.data_flow.len(),
            citations = plan.citations.len(),
            "Architecture plan accepted"
        );
        next.plan = Some(plan);
        StepResult::continue_with(next)
    }
}
