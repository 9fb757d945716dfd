//! Project state for appforge
//!
//! [`ProjectState`] is the single record threaded through the workflow.
//! Steps return updated copies inside a [`StepResult`]; the
//! [`ProjectStateStore`] validates each transition before it takes effect.

mod store;
mod types;

pub use store::{ProjectStateStore, StepResult, StepSignal};
pub use types::{
    ArchitecturePlan, Component, DataFlowEdge, ErrorDetail, ErrorKind, FileTree, PlatformOutcome,
    ProjectState, Requirements, TransitionRecord, WorkflowStatus,
};

pub use appforge_retrieval::SnippetRef;
pub use appforge_utils::error::InvariantViolation;
