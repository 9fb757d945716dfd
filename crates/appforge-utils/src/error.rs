use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::exit_codes::ExitCode;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `AppForgeError` covers failures that happen *outside* a workflow run:
/// loading configuration, constructing providers, exporting generated files.
/// Failures *inside* a run never surface as errors; they are encoded in the
/// terminal project state instead.
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration errors |
/// | 5 | Provider construction errors |
/// | 1 | Other errors |
///
/// Library code returns `AppForgeError` and does NOT call `std::process::exit()`.
#[derive(Error, Debug)]
pub enum AppForgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM backend error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export failed at {path}: {reason}")]
    Export { path: String, reason: String },
}

impl AppForgeError {
    /// Map the error onto the documented exit code table.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Llm(LlmError::Misconfiguration(_) | LlmError::Unsupported(_)) => {
                ExitCode::CLI_ARGS
            }
            Self::Llm(_) | Self::Retrieval(_) => ExitCode::PROVIDER_FAILURE,
            Self::Io(_) | Self::Export { .. } => ExitCode::INTERNAL,
        }
    }

    /// Render the error with context and suggestions for terminal output.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let (message, context, suggestions) = match self {
            Self::Config(e) => (e.user_message(), e.context(), e.suggestions()),
            Self::Llm(e) => (e.user_message(), e.context(), e.suggestions()),
            Self::Retrieval(e) => (e.user_message(), e.context(), e.suggestions()),
            Self::Io(e) => (format!("I/O failure: {e}"), None, Vec::new()),
            Self::Export { path, reason } => (
                format!("Could not write generated files to {path}: {reason}"),
                None,
                vec!["Check that the output directory is writable".to_string()],
            ),
        };

        let mut out = format!("error: {message}");
        if let Some(context) = context {
            out.push_str(&format!("\n  context: {context}"));
        }
        for suggestion in suggestions {
            out.push_str(&format!("\n  hint: {suggestion}"));
        }
        out
    }
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Provider,
    Retrieval,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Provider => write!(f, "Provider"),
            Self::Retrieval => write!(f, "Retrieval"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

/// How a remote failure should be handled by the caller.
///
/// - `Transient`: the same request may succeed later (timeouts, rate limits,
///   outages). Retried with increasing backoff.
/// - `Rejected`: repeating the same request will fail again. Only a revised
///   prompt can help, and only a small number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Transient,
    Rejected,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Errors that can be sorted into a [`FailureClass`].
pub trait Classify {
    fn failure_class(&self) -> FailureClass;

    fn is_transient(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
            Self::ValidationFailed { errors, .. } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "Configuration files must be valid TOML with [workflow], [retrieval] and [llm] sections."
                    .to_string(),
            ),
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "appforge searches for .appforge/config.toml starting from the current directory upward."
                    .to_string(),
            ),
            Self::InvalidValue { .. } | Self::ValidationFailed { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Run `appforge config` to see the effective configuration".to_string(),
            ],
            Self::InvalidValue { key, .. } => match key.as_str() {
                "concurrency_limit" => vec!["Use a positive integer (e.g., 2)".to_string()],
                "min_relevance" => vec!["Use a number between 0.0 and 1.0".to_string()],
                "provider" | "llm.provider" => vec![
                    "Use 'anthropic', 'openai' or 'stub' as the provider".to_string(),
                ],
                _ => vec!["Remove the option to use the default value".to_string()],
            },
            Self::NotFound { .. } => vec![
                "Create .appforge/config.toml in your project root".to_string(),
                "Use CLI flags instead of a configuration file".to_string(),
            ],
            Self::DiscoveryFailed { .. } => vec![
                "Use --config <path> to specify the configuration file explicitly".to_string(),
            ],
            Self::ValidationFailed { .. } => vec![
                "Review the reported keys in .appforge/config.toml".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// LLM backend errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, malformed provider payload)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Provider refused the content (policy, safety filter)
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    /// Provider refused the request shape (400, 413, 422)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Budget limit exceeded
    #[error("Budget exceeded: attempted {attempted} calls, limit is {limit}")]
    BudgetExceeded { limit: u32, attempted: u32 },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Classify for LlmError {
    fn failure_class(&self) -> FailureClass {
        match self {
            Self::Transport(_)
            | Self::ProviderQuota(_)
            | Self::ProviderOutage(_)
            | Self::Timeout { .. } => FailureClass::Transient,
            Self::ProviderAuth(_)
            | Self::ContentRejected(_)
            | Self::InvalidRequest(_)
            | Self::BudgetExceeded { .. }
            | Self::Misconfiguration(_)
            | Self::Unsupported(_) => FailureClass::Rejected,
        }
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {duration:?}")
            }
            Self::ContentRejected(msg) => format!("LLM provider rejected the content: {msg}"),
            Self::InvalidRequest(msg) => format!("LLM provider rejected the request: {msg}"),
            Self::BudgetExceeded { limit, attempted } => format!(
                "LLM budget exceeded: attempted {attempted} calls, limit is {limit}"
            ),
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) => {
                Some("Transport errors occur when the LLM provider cannot be reached.".to_string())
            }
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate missing or invalid API keys.".to_string(),
            ),
            Self::ProviderQuota(_) => Some(
                "Quota errors occur when rate limits or usage limits are exceeded.".to_string(),
            ),
            Self::BudgetExceeded { .. } => Some(
                "The per-run call budget protects against runaway provider costs.".to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) => vec![
                "Export the API key named by api_key_env in [llm.<provider>]".to_string(),
            ],
            Self::ProviderQuota(_) => vec![
                "Lower [workflow] concurrency_limit".to_string(),
                "Wait for the provider rate limit window to reset".to_string(),
            ],
            Self::BudgetExceeded { .. } => {
                vec!["Raise [llm] budget in .appforge/config.toml".to_string()]
            }
            Self::Misconfiguration(_) | Self::Unsupported(_) => {
                vec!["Run `appforge config` to inspect provider settings".to_string()]
            }
            _ => vec!["Retry the run; the provider may recover".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Provider
    }
}

/// Retrieval client errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Retrieval transport error: {0}")]
    Transport(String),

    #[error("Retrieval timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Retrieval service unavailable: {0}")]
    Unavailable(String),

    #[error("Retrieval rate limited: {0}")]
    RateLimited(String),

    #[error("Retrieval query rejected: {0}")]
    InvalidQuery(String),

    #[error("Retrieval authentication failed: {0}")]
    Unauthorized(String),

    #[error("Failed to load corpus from {path}: {reason}")]
    CorpusLoad { path: String, reason: String },
}

impl Classify for RetrievalError {
    fn failure_class(&self) -> FailureClass {
        match self {
            Self::Transport(_) | Self::Timeout { .. } | Self::Unavailable(_) | Self::RateLimited(_) => {
                FailureClass::Transient
            }
            Self::InvalidQuery(_) | Self::Unauthorized(_) | Self::CorpusLoad { .. } => {
                FailureClass::Rejected
            }
        }
    }
}

impl UserFriendlyError for RetrievalError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::CorpusLoad { .. } => Some(
                "The documentation corpus is a directory of *.jsonl files, one document per line."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::CorpusLoad { .. } => {
                vec!["Check [retrieval] corpus_dir in .appforge/config.toml".to_string()]
            }
            Self::Unauthorized(_) => {
                vec!["Export the API key named by [retrieval] api_key_env".to_string()]
            }
            _ => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Retrieval
    }
}

/// A state transition that would break a project state invariant.
///
/// Raised by the project state store. It is an internal programming error,
/// never retried and never shown as a user input problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("state is terminal ({status}); no further transitions are allowed")]
    TerminalState { status: String },

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("platform '{platform}' was removed without re-planning")]
    PlatformRemoved { platform: String },

    #[error("files for platform '{platform}' were populated before the plan referenced it")]
    FilesBeforePlan { platform: String },

    #[error("output recorded for platform '{platform}' which is not selected")]
    UnselectedPlatform { platform: String },

    #[error("architecture plan was replaced without re-planning")]
    PlanReplaced,

    #[error("the original request was modified outside planning")]
    RequestChanged,

    #[error("error detail present on non-failed status {status}")]
    ErrorOnNonFailed { status: String },

    #[error("failed status without error detail")]
    MissingErrorDetail,

    #[error("workflow exceeded {limit} transitions")]
    TransitionLimit { limit: u32 },
}
