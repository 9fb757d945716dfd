//! Workflow orchestrator for appforge
//!
//! Sequences planning, platform selection, architecture design, per-platform
//! code generation and assembly over a [`ProjectState`], calling the
//! Retrieval Client and the Generation Client with bounded retries.

pub mod cancel;
pub mod extraction;
pub mod orchestrator;
pub mod prompts;
pub mod retry;
pub mod scaffold;
pub mod steps;

pub use cancel::CancelHandle;
pub use orchestrator::{Orchestrator, run_id_for};
pub use retry::{CallError, RetryPolicy};
pub use steps::{Services, Step, StepContext};

pub use appforge_state::{
    ErrorDetail, ErrorKind, PlatformOutcome, ProjectState, StepResult, StepSignal, WorkflowStatus,
};
