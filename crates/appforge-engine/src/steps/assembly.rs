use async_trait::async_trait;
use tracing::{info, warn};

use appforge_state::{ErrorDetail, ErrorKind, PlatformOutcome, ProjectState, StepResult};

use super::{Step, StepContext};
use crate::scaffold;

/// Merges per-platform trees into the final project and checks that every
/// usable platform has its entry point.
pub struct AssemblyStep;

const STEP: &str = "assembly";

#[async_trait]
impl Step for AssemblyStep {
    fn name(&self) -> &'static str {
        STEP
    }

    async fn execute(&self, state: &ProjectState, _ctx: &StepContext) -> StepResult {
        let mut next = state.clone();
        let project = scaffold::project_name(
            state
                .requirements
                .as_ref()
                .map_or("", |r| r.summary.as_str()),
        );
        let description = state
            .requirements
            .as_ref()
            .map(|r| r.summary.clone())
            .unwrap_or_default();

        for platform in &state.platforms {
            let Some(outcome) = next.outcomes.get(platform) else {
                continue;
            };
            if !outcome.is_usable() {
                continue;
            }

            let has_entry = next
                .files
                .get(platform)
                .is_some_and(|tree| tree.contains_key(platform.entry_point()));
            if !has_entry {
                warn!(
                    platform = %platform,
                    entry_point = platform.entry_point(),
                    "Entry point missing; platform not assembled"
                );
                next.outcomes.insert(
                    *platform,
                    PlatformOutcome::Failed {
                        kind: ErrorKind::AssemblyFailed,
                        reason: format!("entry point {} was not generated", platform.entry_point()),
                    },
                );
                continue;
            }

            if let Some(tree) = next.files.get_mut(platform) {
                tree.entry(scaffold::PACKAGE_MANIFEST.to_string())
                    .or_insert_with(|| {
                        scaffold::package_manifest(*platform, &project, &description)
                    });
            }
        }

        let usable = next.usable_platforms();
        if usable.is_empty() {
            let detail = nothing_assembled(state);
            return StepResult::fail(next, detail);
        }

        next.project_files
            .insert(scaffold::README.to_string(), scaffold::readme(&next));
        next.project_files
            .insert(scaffold::GITIGNORE.to_string(), scaffold::gitignore(&usable));
        next.project_files
            .insert(scaffold::ENV_EXAMPLE.to_string(), scaffold::env_example(&usable));
        info!(platforms = ?usable, "Project assembled");
        StepResult::continue_with(next)
    }
}

/// Failure detail when no platform could be assembled.
///
/// If every platform already failed during generation, the generation
/// error kind is kept so the exit code reflects the real cause.
fn nothing_assembled(state: &ProjectState) -> ErrorDetail {
    let reasons: Vec<String> = state
        .outcomes
        .iter()
        .map(|(platform, outcome)| match outcome {
            PlatformOutcome::Failed { reason, .. } => format!("{platform}: {reason}"),
            _ => format!("{platform}: entry point {} missing", platform.entry_point()),
        })
        .collect();

    let generation_kind = state
        .outcomes
        .values()
        .map(|outcome| match outcome {
            PlatformOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect::<Option<Vec<ErrorKind>>>()
        .and_then(|kinds| kinds.first().copied());

    let message = if reasons.is_empty() {
        "no platform produced any files".to_string()
    } else {
        format!("no platform assembled ({})", reasons.join("; "))
    };
    ErrorDetail::new(generation_kind.unwrap_or(ErrorKind::AssemblyFailed), message).in_step(STEP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_state::FileTree;
    use appforge_utils::types::Platform;

    fn state_with(outcomes: &[(Platform, PlatformOutcome)]) -> ProjectState {
        let mut state = ProjectState::new("run", "request");
        for (platform, outcome) in outcomes {
            state.platforms.insert(*platform);
            state.outcomes.insert(*platform, outcome.clone());
        }
        state
    }

    #[test]
    fn test_generation_kind_kept_when_every_platform_failed() {
        let state = state_with(&[
            (
                Platform::Web,
                PlatformOutcome::Failed {
                    kind: ErrorKind::Rejected,
                    reason: "policy".into(),
                },
            ),
            (
                Platform::Mobile,
                PlatformOutcome::Failed {
                    kind: ErrorKind::RetryExhausted,
                    reason: "timeouts".into(),
                },
            ),
        ]);
        let detail = nothing_assembled(&state);
        assert_eq!(detail.kind, ErrorKind::Rejected);
        assert!(detail.message.contains("web: policy"));
        assert!(detail.message.contains("mobile: timeouts"));
        assert_eq!(detail.step.as_deref(), Some("assembly"));
    }

    #[test]
    fn test_assembly_failed_when_a_platform_lacked_its_entry_point() {
        let mut state = state_with(&[(Platform::Server, PlatformOutcome::Succeeded)]);
        state.files.insert(
            Platform::Server,
            FileTree::from([("routes.js".to_string(), String::new())]),
        );
        let detail = nothing_assembled(&state);
        assert_eq!(detail.kind, ErrorKind::AssemblyFailed);
        assert!(detail.message.contains("server.js"));
    }
}
