use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use appforge_retrieval::SnippetRef;
use appforge_utils::exit_codes::ExitCode;
use appforge_utils::types::Platform;

/// Relative path to file content.
pub type FileTree = BTreeMap<String, String>;

/// Workflow status. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Planning,
    SelectingPlatforms,
    DesigningArchitecture,
    Generating,
    Assembling,
    Done,
    Failed,
}

impl WorkflowStatus {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Status reached by a `Continue` signal.
    #[must_use]
    pub const fn next(&self) -> Option<Self> {
        match self {
            Self::Planning => Some(Self::SelectingPlatforms),
            Self::SelectingPlatforms => Some(Self::DesigningArchitecture),
            Self::DesigningArchitecture => Some(Self::Generating),
            Self::Generating => Some(Self::Assembling),
            Self::Assembling => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::SelectingPlatforms => "selecting_platforms",
            Self::DesigningArchitecture => "designing_architecture",
            Self::Generating => "generating",
            Self::Assembling => "assembling",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a run or a platform failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Rejected,
    InvariantViolation,
    UserInputUnactionable,
    PartialGenerationFailure,
    RetryExhausted,
    NoPlatforms,
    AssemblyFailed,
    Cancelled,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Rejected => "rejected",
            Self::InvariantViolation => "invariant_violation",
            Self::UserInputUnactionable => "user_input_unactionable",
            Self::PartialGenerationFailure => "partial_generation_failure",
            Self::RetryExhausted => "retry_exhausted",
            Self::NoPlatforms => "no_platforms",
            Self::AssemblyFailed => "assembly_failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Process exit code for a run that failed with this kind.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvariantViolation => ExitCode::INTERNAL,
            Self::UserInputUnactionable => ExitCode::UNACTIONABLE,
            Self::NoPlatforms => ExitCode::NO_PLATFORMS,
            Self::Transient | Self::Rejected | Self::RetryExhausted => ExitCode::PROVIDER_FAILURE,
            Self::AssemblyFailed | Self::PartialGenerationFailure => ExitCode::ASSEMBLY_FAILED,
            Self::Cancelled => ExitCode::CANCELLED,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail carried by a `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    /// Step that gave up, e.g. `architecture`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            step: None,
        }
    }

    #[must_use]
    pub fn in_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step {
            Some(step) => write!(f, "{} in {step}: {}", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Structured requirements extracted from the free-form request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirements {
    pub summary: String,
    pub features: Vec<String>,
    /// Platforms the extraction thinks the user asked for.
    pub platform_hints: BTreeSet<Platform>,
    pub constraints: Vec<String>,
}

/// One application component of the architecture plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    /// `None` for cross-cutting components (shared models, docs).
    pub platform: Option<Platform>,
    #[serde(default)]
    pub responsibility: String,
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFlowEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub description: String,
}

/// Components, their data flow and the reasoning behind them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitecturePlan {
    pub components: Vec<Component>,
    #[serde(default)]
    pub data_flow: Vec<DataFlowEdge>,
    #[serde(default)]
    pub rationale: String,
    /// Snippet sources the plan relies on.
    #[serde(default)]
    pub citations: Vec<String>,
}

impl ArchitecturePlan {
    /// True when some component targets `platform`.
    #[must_use]
    pub fn covers(&self, platform: Platform) -> bool {
        self.components
            .iter()
            .any(|c| c.platform == Some(platform))
    }

    pub fn components_for(&self, platform: Platform) -> impl Iterator<Item = &Component> {
        self.components
            .iter()
            .filter(move |c| c.platform == Some(platform))
    }

    /// Files the plan expects for `platform`, in plan order, deduplicated.
    #[must_use]
    pub fn expected_files(&self, platform: Platform) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.components_for(platform)
            .flat_map(|c| c.files.iter())
            .filter(|f| seen.insert(f.as_str()))
            .cloned()
            .collect()
    }

    /// Structural problems that make the plan unusable for `selected`.
    #[must_use]
    pub fn problems(&self, selected: &BTreeSet<Platform>) -> Vec<String> {
        let mut problems = Vec::new();
        if self.components.is_empty() {
            problems.push("plan has no components".to_string());
        }

        let mut names = BTreeSet::new();
        for component in &self.components {
            if component.name.trim().is_empty() {
                problems.push("component with empty name".to_string());
            } else if !names.insert(component.name.as_str()) {
                problems.push(format!("duplicate component name '{}'", component.name));
            }
        }

        for platform in selected {
            if !self.covers(*platform) {
                problems.push(format!("no component targets platform '{platform}'"));
            }
        }

        for edge in &self.data_flow {
            for end in [&edge.from, &edge.to] {
                if !names.contains(end.as_str()) {
                    problems.push(format!("data flow references unknown component '{end}'"));
                }
            }
        }
        problems
    }
}

/// Per-platform result as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlatformOutcome {
    Succeeded,
    /// Entry point present, some planned files missing.
    Partial { missing: Vec<String> },
    Failed { kind: ErrorKind, reason: String },
}

impl PlatformOutcome {
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Partial { .. })
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Partial { .. } => "partial",
            Self::Failed { .. } => "failed",
        }
    }
}

/// One applied transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: WorkflowStatus,
    pub to: WorkflowStatus,
    /// Signal label, e.g. `continue` or `branch(planning)`.
    pub signal: String,
    pub at: DateTime<Utc>,
}

/// The record threaded through the workflow.
///
/// Steps receive it by reference and return an updated copy; only the
/// project state store sets `status`, `error` and `history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub run_id: String,
    pub request: String,
    pub requirements: Option<Requirements>,
    pub platforms: BTreeSet<Platform>,
    pub plan: Option<ArchitecturePlan>,
    pub files: BTreeMap<Platform, FileTree>,
    /// Documentation used per platform, in retrieval order.
    pub docs: BTreeMap<Platform, Vec<SnippetRef>>,
    pub outcomes: BTreeMap<Platform, PlatformOutcome>,
    /// Files shared by the whole project, such as `README.md`.
    pub project_files: FileTree,
    pub status: WorkflowStatus,
    pub error: Option<ErrorDetail>,
    pub history: Vec<TransitionRecord>,
}

impl ProjectState {
    /// Fresh state holding only the raw request.
    pub fn new(run_id: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            request: request.into(),
            requirements: None,
            platforms: BTreeSet::new(),
            plan: None,
            files: BTreeMap::new(),
            docs: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            project_files: FileTree::new(),
            status: WorkflowStatus::Planning,
            error: None,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Platforms whose outcome is `succeeded` or `partial`.
    #[must_use]
    pub fn usable_platforms(&self) -> Vec<Platform> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.is_usable())
            .map(|(p, _)| *p)
            .collect()
    }

    /// Summary of platforms that failed while the run still reached `Done`.
    #[must_use]
    pub fn partial_failure(&self) -> Option<ErrorDetail> {
        if self.status != WorkflowStatus::Done {
            return None;
        }
        let failed: Vec<String> = self
            .outcomes
            .iter()
            .filter_map(|(platform, outcome)| match outcome {
                PlatformOutcome::Failed { reason, .. } => Some(format!("{platform}: {reason}")),
                _ => None,
            })
            .collect();
        if failed.is_empty() {
            return None;
        }
        Some(ErrorDetail::new(
            ErrorKind::PartialGenerationFailure,
            failed.join("; "),
        ))
    }

    /// Drop everything derived from the request and any error, keeping
    /// identity and history.
    ///
    /// Only valid as part of a re-planning transition.
    pub fn reset_for_replanning(&mut self) {
        self.requirements = None;
        self.platforms.clear();
        self.plan = None;
        self.files.clear();
        self.docs.clear();
        self.outcomes.clear();
        self.project_files.clear();
        self.error = None;
    }
}
