//! Logging and observability infrastructure.
//!
//! Every workflow step runs inside a [`step_span`] carrying the run id, the
//! step name and the attempt number. Generation work for one platform runs in
//! a nested [`platform_span`]. Error text passes through
//! [`redact_error_message`] before it reaches a subscriber.

use std::io::IsTerminal;
use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::redaction::redact_error_message;

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Verbose,
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn from_flags(verbose: bool, json: bool) -> Self {
        match (verbose, json) {
            (_, true) => Self::Json,
            (true, false) => Self::Verbose,
            (false, false) => Self::Compact,
        }
    }
}

fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("appforge=debug,info")
            } else {
                EnvFilter::try_new("appforge=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over the built-in defaults. Logs go to stderr so stdout
/// stays free for `--json` output.
pub fn init_tracing(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = default_filter(format != LogFormat::Compact);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        LogFormat::Verbose => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_ansi(use_color())
                        .with_span_events(FmtSpan::CLOSE)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init()?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_ansi(use_color())
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Span wrapping one step execution.
pub fn step_span(run_id: &str, step: &str, attempt: u32) -> tracing::Span {
    span!(
        Level::INFO,
        "step",
        run_id = %run_id,
        step = %step,
        attempt = attempt,
    )
}

/// Span wrapping one platform's generation task.
pub fn platform_span(run_id: &str, platform: &str) -> tracing::Span {
    span!(Level::INFO, "platform", run_id = %run_id, platform = %platform)
}

pub fn log_step_start(step: &str, attempt: u32) {
    info!(step = %step, attempt = attempt, "Starting step");
}

pub fn log_step_complete(step: &str, signal: &str, duration_ms: u128) {
    info!(
        step = %step,
        signal = %signal,
        duration_ms = %duration_ms,
        "Step completed"
    );
}

/// Log a step failure. The message is redacted first.
pub fn log_step_error(step: &str, kind: &str, message: &str, duration_ms: u128) {
    let sanitized = redact_error_message(message);
    error!(
        step = %step,
        kind = %kind,
        duration_ms = %duration_ms,
        error = %sanitized,
        "Step failed"
    );
}

/// Log a retryable remote failure. The message is redacted first.
pub fn log_retry(operation: &str, attempt: u32, max_attempts: u32, message: &str) {
    let sanitized = redact_error_message(message);
    warn!(
        operation = %operation,
        attempt = attempt,
        max_attempts = max_attempts,
        error = %sanitized,
        "Transient failure, retrying"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_flags() {
        assert_eq!(LogFormat::from_flags(false, false), LogFormat::Compact);
        assert_eq!(LogFormat::from_flags(true, false), LogFormat::Verbose);
        assert_eq!(LogFormat::from_flags(true, true), LogFormat::Json);
        assert_eq!(LogFormat::from_flags(false, true), LogFormat::Json);
    }

    #[test]
    fn test_spans_and_logs_without_subscriber() {
        let span = step_span("run-1", "planning", 1);
        let _guard = span.enter();
        log_step_start("planning", 1);
        log_step_complete("planning", "continue", 3);
        log_step_error("planning", "transient", "sk-abcdefghijklmnopqrstuvwxyz", 3);
        log_retry("planning", 1, 3, "503");
        let _platform = platform_span("run-1", "web");
    }
}
