use appforge_utils::error::ConfigError;

use crate::{Config, KNOWN_PROVIDERS, RetrievalBackendKind, RetryScope};

impl Config {
    /// Validate configuration values.
    ///
    /// Every problem is collected; a single `ValidationFailed` lists them all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let w = &self.workflow;

        if w.concurrency_limit == 0 || w.concurrency_limit > 32 {
            errors.push("workflow.concurrency_limit must be between 1 and 32".to_string());
        }
        if w.call_timeout_secs == 0 || w.call_timeout_secs > 3600 {
            errors.push("workflow.call_timeout_secs must be between 1 and 3600".to_string());
        }
        if w.initial_backoff_ms > w.max_backoff_ms {
            errors.push(
                "workflow.initial_backoff_ms must not exceed workflow.max_backoff_ms".to_string(),
            );
        }
        if w.max_transitions < 8 {
            errors.push("workflow.max_transitions must be at least 8".to_string());
        }
        if w.min_platforms == 0 || w.min_platforms > 4 {
            errors.push("workflow.min_platforms must be between 1 and 4".to_string());
        }
        if w.top_k == 0 || w.top_k > 50 {
            errors.push("workflow.top_k must be between 1 and 50".to_string());
        }

        for scope in RetryScope::ALL {
            let bounds = self.retries.for_scope(scope);
            if bounds.transient_attempts == 0 || bounds.transient_attempts > 10 {
                errors.push(format!(
                    "retries.{scope}.transient_attempts must be between 1 and 10"
                ));
            }
            if bounds.revision_attempts > 5 {
                errors.push(format!("retries.{scope}.revision_attempts must be at most 5"));
            }
        }

        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.min_relevance) {
            errors.push("retrieval.min_relevance must be between 0.0 and 1.0".to_string());
        }
        if r.backend == RetrievalBackendKind::Http && r.base_url.is_none() {
            errors.push("retrieval.base_url is required when backend = \"http\"".to_string());
        }

        let llm = &self.llm;
        if !KNOWN_PROVIDERS.contains(&llm.provider_name()) {
            errors.push(format!(
                "llm.provider '{}' is not one of {}",
                llm.provider_name(),
                KNOWN_PROVIDERS.join(", ")
            ));
        }
        if let Some(fallback) = &llm.fallback_provider {
            if !KNOWN_PROVIDERS.contains(&fallback.as_str()) {
                errors.push(format!("llm.fallback_provider '{fallback}' is not recognized"));
            } else if fallback == llm.provider_name() {
                errors.push("llm.fallback_provider must differ from llm.provider".to_string());
            }
        }
        if llm.budget == Some(0) {
            errors.push("llm.budget must be greater than 0".to_string());
        }
        for (step, overrides) in &llm.steps {
            if RetryScope::parse(step).is_none() {
                errors.push(format!("llm.steps.{step} is not a known step"));
            }
            if let Some(provider) = &overrides.provider
                && !KNOWN_PROVIDERS.contains(&provider.as_str())
            {
                errors.push(format!("llm.steps.{step}.provider '{provider}' is not recognized"));
            }
        }
        for (name, provider) in [("anthropic", &llm.anthropic), ("openai", &llm.openai)] {
            let Some(provider) = provider else { continue };
            if let Some(t) = provider.temperature
                && !(0.0..=2.0).contains(&t)
            {
                errors.push(format!("llm.{name}.temperature must be between 0.0 and 2.0"));
            }
            if provider.max_tokens == Some(0) {
                errors.push(format!("llm.{name}.max_tokens must be greater than 0"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed {
                error_count: errors.len(),
                errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProviderConfig, StepLlmConfig};

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = Config::default();
        config.workflow.concurrency_limit = 0;
        config.workflow.top_k = 0;
        config.retrieval.min_relevance = 1.5;

        match config.validate() {
            Err(ConfigError::ValidationFailed {
                errors,
                error_count,
            }) => {
                assert_eq!(error_count, 3);
                assert!(errors.iter().any(|e| e.contains("concurrency_limit")));
                assert!(errors.iter().any(|e| e.contains("top_k")));
                assert!(errors.iter().any(|e| e.contains("min_relevance")));
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_http_retrieval_requires_base_url() {
        let mut config = Config::default();
        config.retrieval.backend = RetrievalBackendKind::Http;
        assert!(config.validate().is_err());

        config.retrieval.base_url = Some("http://localhost:8080".into());
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_unknown_providers() {
        let mut config = Config::default();
        config.llm.provider = Some("gpt-cli".into());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.steps.insert(
            "planning".into(),
            StepLlmConfig {
                provider: Some("nope".into()),
                model: None,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_fallback_equal_to_primary() {
        let mut config = Config::default();
        config.llm.fallback_provider = Some("anthropic".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_temperature() {
        let mut config = Config::default();
        config.llm.openai = Some(ProviderConfig {
            temperature: Some(3.0),
            ..ProviderConfig::default()
        });
        assert!(config.validate().is_err());
    }
}
