//! Generate command implementation
//!
//! Handles `appforge generate` and `appforge generate --json`.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::io::Read;
use std::path::Path;
use tracing::warn;

use crate::export::export_project;
use crate::report::{exit_code_for, render_report};
use crate::{AppForgeError, CancelHandle, Config, ExitCode, Orchestrator, WorkflowStatus, emit_jcs};

/// Request text from the argument, or stdin when omitted or `-`.
pub fn read_request(arg: Option<String>) -> Result<String> {
    match arg {
        Some(request) if request != "-" => Ok(request),
        _ => {
            let mut request = String::new();
            std::io::stdin()
                .read_to_string(&mut request)
                .context("Failed to read request from stdin")?;
            Ok(request)
        }
    }
}

/// Cancel the run on the first Ctrl-C.
fn cancel_on_interrupt(cancel: CancelHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    })
}

/// Execute the generate command
pub async fn execute_generate_command(
    request: &str,
    out: Option<&Path>,
    json: bool,
    config: Config,
) -> Result<ExitCode> {
    let orchestrator = Orchestrator::from_config(config)?;

    let cancel = CancelHandle::new();
    let interrupt = cancel_on_interrupt(cancel.clone());
    let state = orchestrator.run_with_cancel(request, cancel).await;
    interrupt.abort();

    if json {
        println!("{}", emit_jcs(&state).context("Failed to emit project state JSON")?);
    } else {
        print!("{}", render_report(&state));
    }

    if let Some(out) = out
        && state.status == WorkflowStatus::Done
    {
        let out = Utf8PathBuf::from_path_buf(out.to_path_buf()).map_err(|path| {
            AppForgeError::Export {
                path: path.display().to_string(),
                reason: "output path is not valid UTF-8".to_string(),
            }
        })?;
        let manifest = export_project(&state, &out)?;
        if !json {
            println!("Wrote {} file(s) to {out}", manifest.files.len());
        }
    }

    Ok(exit_code_for(&state))
}
