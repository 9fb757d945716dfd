//! appforge - multi-step application generation
//!
//! Given a natural-language app description, appforge plans requirements,
//! selects target platforms (web, desktop, mobile, server), designs an
//! architecture grounded in retrieved framework documentation, generates a
//! source tree per platform and assembles the result.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Offline run with the stub provider
//! appforge generate "a simple to-do list app for web and mobile" --dry-run --out todo
//!
//! # Full project state as canonical JSON
//! appforge generate "a notes api" --json
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use appforge::{Config, Orchestrator, WorkflowStatus};
//!
//! # async fn demo() -> Result<(), appforge::AppForgeError> {
//! let config = Config::builder().llm_provider("stub").build()?;
//! let orchestrator = Orchestrator::from_config(config)?;
//! let state = orchestrator.run("a to-do list for the web").await;
//! assert_eq!(state.status, WorkflowStatus::Done);
//! # Ok(())
//! # }
//! ```
//!
//! `run` never returns an error. Every failure is encoded in the terminal
//! [`ProjectState`] as status `Failed` with an [`ErrorDetail`].

/// Runs requests through the workflow graph.
pub use appforge_engine::Orchestrator;

/// Cloneable cancellation flag for a running workflow.
pub use appforge_engine::CancelHandle;

pub use appforge_engine::{
    ErrorDetail, ErrorKind, PlatformOutcome, ProjectState, Services, StepResult, StepSignal,
    WorkflowStatus, run_id_for,
};

/// Configuration with discovery and precedence CLI > config file > defaults.
pub use appforge_config::{CliArgs, Config, ConfigBuilder};

/// Library-level error type for failures outside a workflow run.
pub use appforge_utils::error::{AppForgeError, ErrorCategory, UserFriendlyError};

pub use appforge_utils::exit_codes::ExitCode;

/// JCS (RFC 8785) canonical JSON emission.
pub use appforge_utils::canonicalization::emit_jcs;

pub use appforge_utils::types::Platform;

pub mod export;
pub mod report;

#[doc(hidden)]
pub use appforge_config as config;
#[doc(hidden)]
pub use appforge_engine as engine;
#[doc(hidden)]
pub use appforge_llm as llm;
#[doc(hidden)]
pub use appforge_retrieval as retrieval;
#[doc(hidden)]
pub use appforge_state as state;

// CLI module - exported with #[doc(hidden)] for white-box testing of flag parsing
#[doc(hidden)]
pub mod cli;
