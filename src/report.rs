//! Human-readable run summary and exit code selection

use std::fmt::Write as _;

use appforge_state::{PlatformOutcome, ProjectState, WorkflowStatus};
use appforge_utils::exit_codes::ExitCode;

/// Process exit code for a finished run.
///
/// A `Done` run exits 0 even when some platforms failed; the report lists
/// them.
#[must_use]
pub fn exit_code_for(state: &ProjectState) -> ExitCode {
    match (state.status, &state.error) {
        (WorkflowStatus::Done, _) => ExitCode::SUCCESS,
        (WorkflowStatus::Failed, Some(error)) => error.kind.exit_code(),
        _ => ExitCode::INTERNAL,
    }
}

/// Per-platform report: outcome, file count, missing files and reasons.
#[must_use]
pub fn render_report(state: &ProjectState) -> String {
    let mut out = format!("Run {}: {}\n", state.run_id, state.status);

    if let Some(error) = &state.error {
        let step = error.step.as_deref().unwrap_or("workflow");
        let _ = writeln!(out, "  error [{}] in {step}: {}", error.kind, error.message);
    }

    for platform in &state.platforms {
        let files = state.files.get(platform).map_or(0, |tree| tree.len());
        match state.outcomes.get(platform) {
            Some(PlatformOutcome::Succeeded) => {
                let _ = writeln!(out, "  {:<8} succeeded  {files} file(s)", platform.as_str());
            }
            Some(PlatformOutcome::Partial { missing }) => {
                let _ = writeln!(
                    out,
                    "  {:<8} partial    {files} file(s), missing: {}",
                    platform.as_str(),
                    missing.join(", ")
                );
            }
            Some(PlatformOutcome::Failed { kind, reason }) => {
                let _ = writeln!(out, "  {:<8} failed     [{kind}] {reason}", platform.as_str());
            }
            None => {
                let _ = writeln!(out, "  {:<8} not generated", platform.as_str());
            }
        }
    }

    if let Some(partial) = state.partial_failure() {
        let _ = writeln!(out, "  warning [{}]: {}", partial.kind, partial.message);
    }
    out
}
