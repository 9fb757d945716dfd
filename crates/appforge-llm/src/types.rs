//! Core types for the Generation Client abstraction

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use appforge_utils::error::LlmError;
use appforge_utils::types::Platform;

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Input to a Generation Client invocation.
///
/// `metadata` carries provider parameters (`max_tokens`, `temperature`) and
/// structured hints about the prompt (`request`, `platforms`,
/// `expected_files`) that offline backends use to produce responses.
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    pub run_id: String,
    /// Workflow step issuing the call (`planning`, `generation`, ...).
    pub step: String,
    /// Platform the call is scoped to, for per-platform generation.
    pub platform: Option<Platform>,
    /// Model to use; empty selects the backend default.
    pub model: String,
    pub timeout: Duration,
    pub messages: Vec<Message>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        step: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            step: step.into(),
            platform: None,
            model: model.into(),
            timeout,
            messages,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Concatenated user message text.
    #[must_use]
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Result from a Generation Client invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    pub raw_response: String,
    /// Provider name (e.g., "anthropic", "openai", "stub")
    pub provider: String,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}

impl LlmResult {
    #[must_use]
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }
}

/// Trait for Generation Client implementations
///
/// All providers implement this trait, so the orchestrator works with any
/// provider without knowing implementation details. Failures are classified
/// through [`appforge_utils::error::Classify`].
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Invoke the model with the given invocation parameters.
    ///
    /// A single attempt: retries and backoff belong to the caller.
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;
}

/// Provider parameters shared by the HTTP backends.
#[derive(Debug, Clone)]
pub(crate) struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.2,
        }
    }
}

impl HttpParams {
    /// Resolve parameters for one invocation.
    ///
    /// 1. `inv.model` overrides `default_model`
    /// 2. `inv.metadata["max_tokens"]` and `["temperature"]` override defaults
    pub(crate) fn resolve(
        &self,
        default_model: &str,
        inv: &LlmInvocation,
    ) -> (String, HttpParams) {
        let model = if inv.model.is_empty() {
            default_model.to_string()
        } else {
            inv.model.clone()
        };

        let max_tokens = inv
            .metadata
            .get("max_tokens")
            .and_then(serde_json::Value::as_u64)
            .map_or(self.max_tokens, |v| v as u32);

        let temperature = inv
            .metadata
            .get("temperature")
            .and_then(serde_json::Value::as_f64)
            .map_or(self.temperature, |v| v as f32);

        (
            model,
            HttpParams {
                max_tokens,
                temperature,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(model: &str) -> LlmInvocation {
        LlmInvocation::new(
            "run",
            "planning",
            model,
            Duration::from_secs(60),
            vec![
                Message::system("sys"),
                Message::user("first"),
                Message::user("second"),
            ],
        )
    }

    #[test]
    fn test_resolve_params_uses_defaults() {
        let params = HttpParams {
            max_tokens: 1024,
            temperature: 0.5,
        };
        let (model, resolved) = params.resolve("default-model", &invocation(""));
        assert_eq!(model, "default-model");
        assert_eq!(resolved.max_tokens, 1024);
        assert!((resolved.temperature - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_resolve_params_overrides() {
        let inv = invocation("custom")
            .with_metadata("max_tokens", serde_json::json!(2048))
            .with_metadata("temperature", serde_json::json!(0.8));
        let (model, resolved) = HttpParams::default().resolve("default-model", &inv);
        assert_eq!(model, "custom");
        assert_eq!(resolved.max_tokens, 2048);
        assert!((resolved.temperature - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_user_text_skips_system() {
        assert_eq!(invocation("").user_text(), "first\n\nsecond");
    }
}
