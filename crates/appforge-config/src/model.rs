use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use appforge_utils::types::{ConfigSource, Platform};

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 2;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
pub const DEFAULT_MAX_TRANSITIONS: u32 = 64;
pub const DEFAULT_MIN_PLATFORMS: usize = 1;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_RELEVANCE: f32 = 0.2;
pub const DEFAULT_TRANSIENT_ATTEMPTS: u32 = 3;
pub const DEFAULT_PROVIDER: &str = "anthropic";

/// Provider names accepted in `[llm]` and `[llm.steps.*]`.
pub const KNOWN_PROVIDERS: [&str; 3] = ["anthropic", "openai", "stub"];

/// Effective configuration for a workflow run.
///
/// `Config` is assembled with precedence CLI > config file > defaults. Use
/// [`Config::discover()`] for CLI behavior or [`Config::builder()`] for
/// deterministic programmatic construction.
///
/// # Configuration File Format
///
/// ```toml
/// [workflow]
/// concurrency_limit = 2
/// call_timeout_secs = 120
/// fallback_platforms = ["web"]
///
/// [retries.generation]
/// transient_attempts = 3
/// revision_attempts = 2
///
/// [retrieval]
/// backend = "memory"
/// corpus_dir = "docs/corpus"
/// min_relevance = 0.2
///
/// [llm]
/// provider = "anthropic"
/// budget = 40
///
/// [llm.steps.planning]
/// provider = "openai"
/// model = "deepseek-reasoner"
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub workflow: WorkflowConfig,
    pub retries: RetriesConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    /// Path of the config file that was loaded, if any.
    pub config_path: Option<PathBuf>,
    /// Source attribution for each setting (for `appforge config`).
    pub source_attribution: BTreeMap<String, ConfigSource>,
}

impl Default for Config {
    fn default() -> Self {
        let mut source_attribution = BTreeMap::new();
        for key in ATTRIBUTED_KEYS {
            source_attribution.insert((*key).to_string(), ConfigSource::Default);
        }
        Self {
            workflow: WorkflowConfig::default(),
            retries: RetriesConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            config_path: None,
            source_attribution,
        }
    }
}

/// Keys that always carry a source attribution.
pub(crate) const ATTRIBUTED_KEYS: &[&str] = &[
    "concurrency_limit",
    "call_timeout_secs",
    "initial_backoff_ms",
    "max_backoff_ms",
    "max_transitions",
    "fallback_platforms",
    "min_platforms",
    "top_k",
    "retries",
    "retrieval_backend",
    "min_relevance",
    "llm_provider",
    "llm_budget",
];

impl Config {
    /// Effective source of a setting, `default` when untracked.
    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .copied()
            .unwrap_or(ConfigSource::Default)
    }
}

/// `[workflow]` section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowConfig {
    /// Maximum number of platforms generated concurrently.
    pub concurrency_limit: usize,
    /// Timeout applied to every single remote call.
    pub call_timeout_secs: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Hard cap on dispatcher transitions per run.
    pub max_transitions: u32,
    /// Used when neither the rules nor the model justify any platform.
    pub fallback_platforms: Vec<Platform>,
    pub min_platforms: usize,
    /// Number of documentation snippets requested per retrieval call.
    pub top_k: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_transitions: DEFAULT_MAX_TRANSITIONS,
            fallback_platforms: Vec::new(),
            min_platforms: DEFAULT_MIN_PLATFORMS,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl WorkflowConfig {
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

/// Workflow steps that issue remote calls and therefore carry retry bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryScope {
    Planning,
    PlatformSelection,
    Architecture,
    Generation,
}

impl RetryScope {
    pub const ALL: [RetryScope; 4] = [
        RetryScope::Planning,
        RetryScope::PlatformSelection,
        RetryScope::Architecture,
        RetryScope::Generation,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::PlatformSelection => "platform_selection",
            Self::Architecture => "architecture",
            Self::Generation => "generation",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scope| scope.as_str() == s)
    }
}

impl fmt::Display for RetryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry bounds for one step.
///
/// `transient_attempts` counts every try of a single remote call, including
/// the first. `revision_attempts` counts how many times the step may re-ask
/// with a revised prompt after a rejected or malformed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBounds {
    pub transient_attempts: u32,
    pub revision_attempts: u32,
}

impl RetryBounds {
    #[must_use]
    pub const fn new(transient_attempts: u32, revision_attempts: u32) -> Self {
        Self {
            transient_attempts,
            revision_attempts,
        }
    }

    #[must_use]
    pub const fn default_for(scope: RetryScope) -> Self {
        match scope {
            RetryScope::Architecture | RetryScope::Generation => {
                Self::new(DEFAULT_TRANSIENT_ATTEMPTS, 2)
            }
            RetryScope::Planning | RetryScope::PlatformSelection => {
                Self::new(DEFAULT_TRANSIENT_ATTEMPTS, 1)
            }
        }
    }
}

/// `[retries.*]` sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetriesConfig {
    pub planning: RetryBounds,
    pub platform_selection: RetryBounds,
    pub architecture: RetryBounds,
    pub generation: RetryBounds,
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            planning: RetryBounds::default_for(RetryScope::Planning),
            platform_selection: RetryBounds::default_for(RetryScope::PlatformSelection),
            architecture: RetryBounds::default_for(RetryScope::Architecture),
            generation: RetryBounds::default_for(RetryScope::Generation),
        }
    }
}

impl RetriesConfig {
    #[must_use]
    pub fn for_scope(&self, scope: RetryScope) -> RetryBounds {
        match scope {
            RetryScope::Planning => self.planning,
            RetryScope::PlatformSelection => self.platform_selection,
            RetryScope::Architecture => self.architecture,
            RetryScope::Generation => self.generation,
        }
    }

    pub fn set(&mut self, scope: RetryScope, bounds: RetryBounds) {
        match scope {
            RetryScope::Planning => self.planning = bounds,
            RetryScope::PlatformSelection => self.platform_selection = bounds,
            RetryScope::Architecture => self.architecture = bounds,
            RetryScope::Generation => self.generation = bounds,
        }
    }
}

/// Which retrieval client implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalBackendKind {
    /// In-process corpus loaded from `corpus_dir`.
    #[default]
    Memory,
    /// Remote vector-search service at `base_url`.
    Http,
}

impl fmt::Display for RetrievalBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// `[retrieval]` section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalConfig {
    pub backend: RetrievalBackendKind,
    pub corpus_dir: Option<PathBuf>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    /// Snippets scoring below this are dropped.
    pub min_relevance: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: RetrievalBackendKind::Memory,
            corpus_dir: None,
            base_url: None,
            api_key_env: None,
            min_relevance: DEFAULT_MIN_RELEVANCE,
        }
    }
}

/// `[llm]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub fallback_provider: Option<String>,
    /// Maximum number of generation calls per run.
    pub budget: Option<u32>,
    pub anthropic: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
    /// Per-step provider/model overrides keyed by step name.
    #[serde(default)]
    pub steps: BTreeMap<String, StepLlmConfig>,
}

/// HTTP provider settings shared by `[llm.anthropic]` and `[llm.openai]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// `[llm.steps.<step>]` override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepLlmConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl LlmConfig {
    /// Provider for all steps without an override.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    /// Provider for a given step: `[llm.steps.<step>] provider` > `[llm] provider`.
    #[must_use]
    pub fn provider_for_step(&self, scope: RetryScope) -> &str {
        self.steps
            .get(scope.as_str())
            .and_then(|s| s.provider.as_deref())
            .unwrap_or_else(|| self.provider_name())
    }

    /// Model for a given step: step override > provider section model.
    ///
    /// `None` lets the backend fall back to its built-in default model.
    #[must_use]
    pub fn model_for_step(&self, scope: RetryScope) -> Option<&str> {
        if let Some(model) = self
            .steps
            .get(scope.as_str())
            .and_then(|s| s.model.as_deref())
        {
            return Some(model);
        }
        self.provider_config(self.provider_for_step(scope))
            .and_then(|p| p.model.as_deref())
    }

    /// Settings section for a named provider, if present.
    #[must_use]
    pub fn provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        match provider {
            "anthropic" => self.anthropic.as_ref(),
            "openai" => self.openai.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults_per_scope() {
        let retries = RetriesConfig::default();
        assert_eq!(retries.for_scope(RetryScope::Planning), RetryBounds::new(3, 1));
        assert_eq!(
            retries.for_scope(RetryScope::PlatformSelection),
            RetryBounds::new(3, 1)
        );
        assert_eq!(
            retries.for_scope(RetryScope::Architecture),
            RetryBounds::new(3, 2)
        );
        assert_eq!(retries.for_scope(RetryScope::Generation), RetryBounds::new(3, 2));
    }

    #[test]
    fn test_retry_scope_parse() {
        assert_eq!(
            RetryScope::parse("platform_selection"),
            Some(RetryScope::PlatformSelection)
        );
        assert_eq!(RetryScope::parse("assembly"), None);
    }

    #[test]
    fn test_step_model_precedence() {
        let mut llm = LlmConfig {
            provider: Some("anthropic".into()),
            anthropic: Some(ProviderConfig {
                model: Some("claude-sonnet".into()),
                ..ProviderConfig::default()
            }),
            openai: Some(ProviderConfig {
                model: Some("deepseek-chat".into()),
                ..ProviderConfig::default()
            }),
            ..LlmConfig::default()
        };

        assert_eq!(llm.provider_for_step(RetryScope::Generation), "anthropic");
        assert_eq!(llm.model_for_step(RetryScope::Generation), Some("claude-sonnet"));

        llm.steps.insert(
            "planning".into(),
            StepLlmConfig {
                provider: Some("openai".into()),
                model: None,
            },
        );
        assert_eq!(llm.provider_for_step(RetryScope::Planning), "openai");
        assert_eq!(llm.model_for_step(RetryScope::Planning), Some("deepseek-chat"));

        llm.steps.insert(
            "architecture".into(),
            StepLlmConfig {
                provider: None,
                model: Some("deepseek-reasoner".into()),
            },
        );
        assert_eq!(
            llm.model_for_step(RetryScope::Architecture),
            Some("deepseek-reasoner")
        );
    }

    #[test]
    fn test_default_provider() {
        assert_eq!(LlmConfig::default().provider_name(), "anthropic");
    }

    #[test]
    fn test_durations() {
        let workflow = WorkflowConfig::default();
        assert_eq!(workflow.call_timeout(), Duration::from_secs(120));
        assert_eq!(workflow.initial_backoff(), Duration::from_millis(1000));
        assert_eq!(workflow.max_backoff(), Duration::from_secs(30));
    }
}
