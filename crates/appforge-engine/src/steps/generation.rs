use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{Instrument, info, warn};

use appforge_config::RetryScope;
use appforge_retrieval::SnippetRef;
use appforge_state::{
    ArchitecturePlan, ErrorDetail, ErrorKind, FileTree, PlatformOutcome, ProjectState,
    Requirements, StepResult,
};
use appforge_utils::logging::platform_span;
use appforge_utils::types::Platform;

use super::{Step, StepContext, cancelled};
use crate::extraction::parse_files;
use crate::prompts;
use crate::retry::CallError;

/// Generates every selected platform concurrently, bounded by
/// `workflow.concurrency_limit`. A failed platform never aborts the others.
pub struct GenerationStep;

const SCOPE: RetryScope = RetryScope::Generation;

/// What one platform task produced.
#[derive(Debug)]
struct PlatformGeneration {
    platform: Platform,
    files: FileTree,
    docs: Vec<SnippetRef>,
    outcome: PlatformOutcome,
}

#[async_trait]
impl Step for GenerationStep {
    fn name(&self) -> &'static str {
        "generation"
    }

    async fn execute(&self, state: &ProjectState, ctx: &StepContext) -> StepResult {
        let Some(plan) = state.plan.clone() else {
            return StepResult::fail(
                state.clone(),
                ErrorDetail::new(
                    ErrorKind::InvariantViolation,
                    "generation reached without an architecture plan",
                )
                .in_step(SCOPE.as_str()),
            );
        };
        let plan = Arc::new(plan);
        let requirements = Arc::new(state.requirements.clone().unwrap_or_default());
        let limit = ctx.services.config.workflow.concurrency_limit.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));

        let mut tasks = JoinSet::new();
        for platform in &state.platforms {
            if state.outcomes.contains_key(platform) {
                continue;
            }
            let platform = *platform;
            let ctx = ctx.clone();
            let plan = plan.clone();
            let requirements = requirements.clone();
            let prior_docs = state.docs.get(&platform).cloned().unwrap_or_default();
            let semaphore = semaphore.clone();
            let span = platform_span(&ctx.run_id, platform.as_str());

            tasks.spawn(
                async move {
                    let _permit = match acquire_slot(semaphore, platform, &prior_docs).await {
                        Ok(permit) => permit,
                        Err(failed) => return failed,
                    };
                    generate_platform(&ctx, platform, &requirements, &plan, prior_docs).await
                }
                .instrument(span),
            );
        }

        let mut next = state.clone();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(generated) => record(&mut next, generated),
                Err(e) => warn!(error = %e, "Generation task ended abnormally"),
            }
        }

        if ctx.cancel.is_cancelled() {
            return cancelled(state, SCOPE);
        }

        for platform in &state.platforms {
            next.outcomes
                .entry(*platform)
                .or_insert_with(|| PlatformOutcome::Failed {
                    kind: ErrorKind::InvariantViolation,
                    reason: "generation task did not complete".to_string(),
                });
        }

        StepResult::continue_with(next)
    }
}

fn record(state: &mut ProjectState, generated: PlatformGeneration) {
    let PlatformGeneration {
        platform,
        files,
        docs,
        outcome,
    } = generated;
    info!(
        platform = %platform,
        outcome = outcome.label(),
        files = files.len(),
        "Platform generation finished"
    );
    state.docs.insert(platform, docs);
    if !files.is_empty() {
        state.files.insert(platform, files);
    }
    state.outcomes.insert(platform, outcome);
}

/// Wait for a generation slot. A closed limiter fails the platform.
async fn acquire_slot(
    semaphore: Arc<Semaphore>,
    platform: Platform,
    prior_docs: &[SnippetRef],
) -> Result<OwnedSemaphorePermit, PlatformGeneration> {
    semaphore.acquire_owned().await.map_err(|e| {
        warn!(platform = %platform, error = %e, "Concurrency limiter closed");
        PlatformGeneration {
            platform,
            files: FileTree::new(),
            docs: prior_docs.to_vec(),
            outcome: PlatformOutcome::Failed {
                kind: ErrorKind::InvariantViolation,
                reason: format!("concurrency limiter unavailable: {e}"),
            },
        }
    })
}

/// Files requested from the model: the plan's files with the entry point first.
fn requested_files(plan: &ArchitecturePlan, platform: Platform) -> Vec<String> {
    let mut files = plan.expected_files(platform);
    if !files.iter().any(|f| f == platform.entry_point()) {
        files.insert(0, platform.entry_point().to_string());
    }
    files
}

fn merge_docs(prior: Vec<SnippetRef>, fresh: Vec<SnippetRef>) -> Vec<SnippetRef> {
    let mut seen: HashSet<String> = prior.iter().map(|s| s.source.clone()).collect();
    let mut merged = prior;
    merged.extend(fresh.into_iter().filter(|s| seen.insert(s.source.clone())));
    merged
}

async fn generate_platform(
    ctx: &StepContext,
    platform: Platform,
    requirements: &Requirements,
    plan: &ArchitecturePlan,
    prior_docs: Vec<SnippetRef>,
) -> PlatformGeneration {
    let expected = requested_files(plan, platform);
    let focus: Vec<&str> = plan.components_for(platform).map(|c| c.name.as_str()).collect();
    let query = prompts::retrieval_query(requirements, platform, &focus);

    // Documentation for this platform is in hand before any generation call.
    let fresh = match ctx.services.search_docs(ctx, SCOPE, &query, platform).await {
        Ok(snippets) => snippets,
        Err(_) => Vec::new(),
    };
    let docs = merge_docs(prior_docs, fresh);

    let failed = |docs: Vec<SnippetRef>, kind: ErrorKind, reason: String| PlatformGeneration {
        platform,
        files: FileTree::new(),
        docs,
        outcome: PlatformOutcome::Failed { kind, reason },
    };

    let attempts = ctx.services.step_attempts(SCOPE);
    let mut note: Option<String> = None;
    let mut last_failure = (ErrorKind::RetryExhausted, String::new());

    for attempt in 1..=attempts {
        let messages =
            prompts::generation(platform, requirements, plan, &expected, &docs, note.as_deref());
        let response = ctx
            .services
            .complete(
                ctx,
                SCOPE,
                Some(platform),
                messages,
                vec![("expected_files", json!(expected))],
            )
            .await;

        let problem = match response {
            Ok(raw) => match parse_files(&raw) {
                Ok(files) => {
                    let produced: BTreeSet<&str> = files.keys().map(String::as_str).collect();
                    let missing: Vec<String> = expected
                        .iter()
                        .filter(|f| !produced.contains(f.as_str()))
                        .cloned()
                        .collect();
                    let outcome = if missing.is_empty() {
                        PlatformOutcome::Succeeded
                    } else {
                        PlatformOutcome::Partial { missing }
                    };
                    return PlatformGeneration {
                        platform,
                        files,
                        docs,
                        outcome,
                    };
                }
                Err(problem) => (ErrorKind::RetryExhausted, problem),
            },
            Err(CallError::Rejected { message }) => (ErrorKind::Rejected, message),
            Err(e @ CallError::Exhausted { .. }) => {
                return failed(docs, ErrorKind::RetryExhausted, e.to_string());
            }
            Err(CallError::Cancelled) => {
                return failed(docs, ErrorKind::Cancelled, "run cancelled".to_string());
            }
        };

        warn!(
            platform = %platform,
            attempt = attempt,
            max_attempts = attempts,
            problem = %problem.1,
            "Generation attempt unusable"
        );
        note = Some(problem.1.clone());
        last_failure = problem;
    }

    let (kind, reason) = last_failure;
    failed(
        docs,
        kind,
        format!("no usable output after {attempts} attempt(s): {reason}"),
    )
}
