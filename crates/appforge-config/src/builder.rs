use std::path::PathBuf;
use std::time::Duration;

use appforge_utils::error::ConfigError;
use appforge_utils::types::{ConfigSource, Platform};

use crate::{Config, ProviderConfig, RetryBounds, RetryScope, StepLlmConfig};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// ```rust
    /// use appforge_config::Config;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .llm_provider("stub")
    ///     .concurrency_limit(4)
    ///     .call_timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.workflow.concurrency_limit, 4);
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for programmatic configuration.
///
/// Values set via the builder are attributed to `ConfigSource::Programmatic`.
/// No environment variable or config file is read.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
    touched: Vec<&'static str>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(mut self, key: &'static str) -> Self {
        self.touched.push(key);
        self
    }

    #[must_use]
    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.config.workflow.concurrency_limit = limit;
        self.touch("concurrency_limit")
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.workflow.call_timeout_secs = timeout.as_secs().max(1);
        self.touch("call_timeout_secs")
    }

    /// Set both ends of the exponential backoff range.
    #[must_use]
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.workflow.initial_backoff_ms = initial.as_millis() as u64;
        self.config.workflow.max_backoff_ms = max.as_millis() as u64;
        self.touch("initial_backoff_ms").touch("max_backoff_ms")
    }

    #[must_use]
    pub fn max_transitions(mut self, max: u32) -> Self {
        self.config.workflow.max_transitions = max;
        self.touch("max_transitions")
    }

    #[must_use]
    pub fn fallback_platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.config.workflow.fallback_platforms = platforms.into_iter().collect();
        self.touch("fallback_platforms")
    }

    #[must_use]
    pub fn min_platforms(mut self, min: usize) -> Self {
        self.config.workflow.min_platforms = min;
        self.touch("min_platforms")
    }

    #[must_use]
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.config.workflow.top_k = top_k;
        self.touch("top_k")
    }

    #[must_use]
    pub fn retries(mut self, scope: RetryScope, bounds: RetryBounds) -> Self {
        self.config.retries.set(scope, bounds);
        self.touch("retries")
    }

    #[must_use]
    pub fn min_relevance(mut self, threshold: f32) -> Self {
        self.config.retrieval.min_relevance = threshold;
        self.touch("min_relevance")
    }

    #[must_use]
    pub fn corpus_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.retrieval.corpus_dir = Some(dir.into());
        self.touch("corpus_dir")
    }

    #[must_use]
    pub fn llm_provider(mut self, provider: impl Into<String>) -> Self {
        self.config.llm.provider = Some(provider.into());
        self.touch("llm_provider")
    }

    #[must_use]
    pub fn llm_budget(mut self, budget: u32) -> Self {
        self.config.llm.budget = Some(budget);
        self.touch("llm_budget")
    }

    /// Configure the Anthropic provider section.
    #[must_use]
    pub fn anthropic(mut self, provider: ProviderConfig) -> Self {
        self.config.llm.anthropic = Some(provider);
        self
    }

    /// Configure the OpenAI-compatible provider section.
    #[must_use]
    pub fn openai(mut self, provider: ProviderConfig) -> Self {
        self.config.llm.openai = Some(provider);
        self
    }

    /// Route a single step to a specific provider and/or model.
    #[must_use]
    pub fn step_llm(
        mut self,
        scope: RetryScope,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Self {
        self.config.llm.steps.insert(
            scope.as_str().to_string(),
            StepLlmConfig {
                provider: provider.map(str::to_string),
                model: model.map(str::to_string),
            },
        );
        self.touch("llm_steps")
    }

    /// Build the configuration, validating every value.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut config = self.config;
        for key in self.touched {
            config
                .source_attribution
                .insert(key.to_string(), ConfigSource::Programmatic);
        }
        config.validate()?;
        Ok(config)
    }
}
