//! Generation Client backends for appforge
//!
//! Provides the [`LlmBackend`] trait, HTTP providers (Anthropic and
//! OpenAI-compatible), an offline stub, a budget wrapper and the
//! [`LlmRouter`] that resolves which backend and model serve each step.

mod anthropic_backend;
mod budgeted_backend;
mod http_client;
mod openai_backend;
#[cfg(any(test, feature = "test-utils"))]
mod scripted_backend;
mod stub_backend;
mod types;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::warn;

use appforge_config::{Config, RetryScope};
use appforge_utils::redaction::redact_error_message;

pub use appforge_utils::error::LlmError;
pub use budgeted_backend::BudgetedBackend;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted_backend::{RecordedCall, ScriptedBackend};
pub use stub_backend::{STUB_PROVIDER, StubBackend};
pub use types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

/// Information about provider fallback during backend construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmFallbackInfo {
    pub primary_provider: String,
    pub fallback_provider: String,
    /// Redacted construction error of the primary provider.
    pub reason: String,
}

/// Backend plus model chosen for one step.
#[derive(Clone)]
pub struct StepRoute {
    pub provider: String,
    pub backend: Arc<dyn LlmBackend>,
    /// Empty means the backend default.
    pub model: String,
}

/// Per-step routing of Generation Client calls.
///
/// Provider identity is configuration: planning may go to one provider while
/// code generation goes to another. All routes share one call budget.
#[derive(Clone)]
pub struct LlmRouter {
    routes: HashMap<RetryScope, StepRoute>,
    fallback: Option<LlmFallbackInfo>,
    /// Call counter shared by every budgeted route.
    budget: Option<Arc<AtomicU32>>,
}

impl LlmRouter {
    /// Route every step to the same backend with the backend's default model.
    #[must_use]
    pub fn single(provider: &str, backend: Arc<dyn LlmBackend>) -> Self {
        let routes = RetryScope::ALL
            .into_iter()
            .map(|scope| {
                (
                    scope,
                    StepRoute {
                        provider: provider.to_string(),
                        backend: backend.clone(),
                        model: String::new(),
                    },
                )
            })
            .collect();
        Self {
            routes,
            fallback: None,
            budget: None,
        }
    }

    /// Offline router used by `--dry-run`.
    #[must_use]
    pub fn stub() -> Self {
        Self::single(STUB_PROVIDER, Arc::new(StubBackend::new()))
    }

    /// Build routes from `[llm]` configuration.
    ///
    /// Each distinct provider is constructed once. When a provider cannot be
    /// constructed and `fallback_provider` is set, the fallback serves that
    /// provider's steps. `[llm] budget` wraps every backend with one shared
    /// call counter.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let llm = &config.llm;
        let counter = Arc::new(AtomicU32::new(0));
        let mut built: BTreeMap<String, (String, Arc<dyn LlmBackend>)> = BTreeMap::new();
        let mut fallback = None;
        let mut routes = HashMap::new();

        for scope in RetryScope::ALL {
            let requested = llm.provider_for_step(scope).to_string();

            if !built.contains_key(&requested) {
                let (provider, backend, info) =
                    construct_with_fallback(&requested, config)?;
                if info.is_some() {
                    fallback = info;
                }
                let backend = match llm.budget {
                    Some(limit) => Arc::new(BudgetedBackend::sharing(
                        backend,
                        limit,
                        counter.clone(),
                    )) as Arc<dyn LlmBackend>,
                    None => backend,
                };
                built.insert(requested.clone(), (provider, backend));
            }

            let (provider, backend) = built[&requested].clone();
            let model = if provider == requested {
                llm.model_for_step(scope).unwrap_or_default().to_string()
            } else {
                // The step model belongs to the unavailable provider.
                llm.provider_config(&provider)
                    .and_then(|p| p.model.clone())
                    .unwrap_or_default()
            };

            if model.is_empty() && provider != STUB_PROVIDER {
                return Err(LlmError::Misconfiguration(format!(
                    "no model configured for step '{scope}'. \
                     Set [llm.{provider}] model or [llm.steps.{scope}] model."
                )));
            }

            routes.insert(
                scope,
                StepRoute {
                    provider,
                    backend,
                    model,
                },
            );
        }

        Ok(Self {
            routes,
            fallback,
            budget: llm.budget.map(|_| counter),
        })
    }

    /// Route for a step.
    #[must_use]
    pub fn route(&self, scope: RetryScope) -> &StepRoute {
        &self.routes[&scope]
    }

    /// Calls counted against `[llm] budget` so far, if a budget is set.
    #[must_use]
    pub fn budget_used(&self) -> Option<u32> {
        self.budget.as_ref().map(|c| c.load(Ordering::SeqCst))
    }

    /// Give the next run the full `[llm] budget`.
    pub fn reset_budget(&self) {
        if let Some(counter) = &self.budget {
            counter.store(0, Ordering::SeqCst);
        }
    }

    /// Set when a fallback provider replaced the configured one.
    #[must_use]
    pub fn fallback_info(&self) -> Option<&LlmFallbackInfo> {
        self.fallback.as_ref()
    }
}

fn construct_backend_for_provider(
    provider: &str,
    config: &Config,
) -> Result<Arc<dyn LlmBackend>, LlmError> {
    match provider {
        "anthropic" => Ok(Arc::new(anthropic_backend::AnthropicBackend::new_from_config(
            config.llm.anthropic.as_ref(),
        )?)),
        "openai" => Ok(Arc::new(openai_backend::OpenAiBackend::new_from_config(
            config.llm.openai.as_ref(),
        )?)),
        STUB_PROVIDER => Ok(Arc::new(StubBackend::new())),
        other => Err(LlmError::Unsupported(format!(
            "Unknown LLM provider '{other}'. Supported providers: anthropic, openai, stub"
        ))),
    }
}

fn construct_with_fallback(
    provider: &str,
    config: &Config,
) -> Result<(String, Arc<dyn LlmBackend>, Option<LlmFallbackInfo>), LlmError> {
    let primary_error = match construct_backend_for_provider(provider, config) {
        Ok(backend) => return Ok((provider.to_string(), backend, None)),
        Err(e) => e,
    };

    let Some(fallback_provider) = config.llm.fallback_provider.as_deref() else {
        return Err(primary_error);
    };
    if fallback_provider == provider {
        return Err(primary_error);
    }

    let reason = redact_error_message(&primary_error.to_string());
    warn!(
        primary = provider,
        fallback = fallback_provider,
        reason = %reason,
        "Primary provider failed during construction, using fallback"
    );

    match construct_backend_for_provider(fallback_provider, config) {
        Ok(backend) => Ok((
            fallback_provider.to_string(),
            backend,
            Some(LlmFallbackInfo {
                primary_provider: provider.to_string(),
                fallback_provider: fallback_provider.to_string(),
                reason,
            }),
        )),
        Err(fallback_error) => {
            warn!(
                fallback = fallback_provider,
                error = %redact_error_message(&fallback_error.to_string()),
                "Fallback provider also failed"
            );
            Err(primary_error)
        }
    }
}

#[cfg(test)]
mod factory_tests {
    use super::*;
    use appforge_config::ProviderConfig;

    fn missing_key_provider() -> ProviderConfig {
        ProviderConfig {
            api_key_env: Some("APPFORGE_TEST_KEY_THAT_IS_NEVER_SET".into()),
            model: Some("m".into()),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_stub_provider_needs_no_model() {
        let config = Config::builder().llm_provider("stub").build().unwrap();
        let router = LlmRouter::from_config(&config).unwrap();
        assert_eq!(router.route(RetryScope::Planning).provider, "stub");
        assert!(router.fallback_info().is_none());
        assert_eq!(router.budget_used(), None);
    }

    #[tokio::test]
    async fn test_budget_is_shared_across_steps_and_resettable() {
        let config = Config::builder()
            .llm_provider("stub")
            .llm_budget(2)
            .build()
            .unwrap();
        let router = LlmRouter::from_config(&config).unwrap();
        let invoke = |scope: RetryScope| {
            let route = router.route(scope).clone();
            async move {
                let inv = LlmInvocation::new(
                    "run",
                    scope.as_str(),
                    route.model,
                    std::time::Duration::from_secs(5),
                    vec![Message::user("a to-do list web app")],
                );
                route.backend.invoke(inv).await
            }
        };

        assert!(invoke(RetryScope::Planning).await.is_ok());
        assert!(invoke(RetryScope::PlatformSelection).await.is_ok());
        assert!(matches!(
            invoke(RetryScope::Planning).await,
            Err(LlmError::BudgetExceeded { limit: 2, .. })
        ));

        router.reset_budget();
        assert_eq!(router.budget_used(), Some(0));
        assert!(invoke(RetryScope::Planning).await.is_ok());
        assert_eq!(router.budget_used(), Some(1));
    }

    #[test]
    fn test_missing_api_key_is_misconfiguration() {
        let config = Config::builder()
            .llm_provider("anthropic")
            .anthropic(missing_key_provider())
            .build()
            .unwrap();
        assert!(matches!(
            LlmRouter::from_config(&config),
            Err(LlmError::Misconfiguration(_))
        ));
    }

    #[test]
    fn test_fallback_provider_is_used() {
        let mut config = Config::builder()
            .llm_provider("anthropic")
            .anthropic(missing_key_provider())
            .build()
            .unwrap();
        config.llm.fallback_provider = Some("stub".into());

        let router = LlmRouter::from_config(&config).unwrap();
        let info = router.fallback_info().unwrap();
        assert_eq!(info.primary_provider, "anthropic");
        assert_eq!(info.fallback_provider, "stub");
        assert_eq!(router.route(RetryScope::Generation).provider, "stub");
    }

    #[test]
    fn test_step_override_routes_to_other_provider() {
        let config = Config::builder()
            .llm_provider("stub")
            .step_llm(RetryScope::Planning, Some("openai"), Some("reasoner"))
            .openai(missing_key_provider())
            .build()
            .unwrap();
        // openai cannot be constructed without a key and no fallback is set
        assert!(LlmRouter::from_config(&config).is_err());
    }

    #[test]
    fn test_single_routes_every_step() {
        let router = LlmRouter::stub();
        for scope in RetryScope::ALL {
            assert_eq!(router.route(scope).provider, STUB_PROVIDER);
            assert!(router.route(scope).model.is_empty());
        }
    }
}
