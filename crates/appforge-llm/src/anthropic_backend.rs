//! Anthropic HTTP backend implementation
//!
//! Talks to Anthropic's Messages API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use appforge_config::ProviderConfig;
use appforge_utils::error::LlmError;

use crate::http_client::HttpClient;
use crate::types::{HttpParams, LlmBackend, LlmInvocation, LlmResult, Message, Role};

/// Default Anthropic API endpoint
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Clone)]
pub(crate) struct AnthropicBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl AnthropicBackend {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, LlmError> {
        let client = HttpClient::new()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            default_params,
        })
    }

    /// Create a backend from `[llm.anthropic]`.
    ///
    /// The API key is read from the environment variable named by
    /// `api_key_env` (default `ANTHROPIC_API_KEY`).
    pub fn new_from_config(config: Option<&ProviderConfig>) -> Result<Self, LlmError> {
        let api_key_env = config
            .and_then(|a| a.api_key_env.as_deref())
            .unwrap_or(DEFAULT_API_KEY_ENV);

        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "Anthropic API key not found in environment variable '{api_key_env}'. \
                 Please set this variable or configure a different api_key_env in [llm.anthropic]."
            ))
        })?;

        let default_model = config
            .and_then(|a| a.model.clone())
            .unwrap_or_default();

        let defaults = HttpParams::default();
        let default_params = HttpParams {
            max_tokens: config
                .and_then(|a| a.max_tokens)
                .unwrap_or(defaults.max_tokens),
            temperature: config
                .and_then(|a| a.temperature)
                .unwrap_or(defaults.temperature),
        };

        Self::new(
            api_key,
            config.and_then(|a| a.base_url.clone()),
            default_model,
            default_params,
        )
    }

    /// Split system messages into Anthropic's top-level `system` field.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_prompt: Option<String> = None;
        let mut anthropic_messages = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    if let Some(existing) = system_prompt.as_mut() {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    } else {
                        system_prompt = Some(msg.content.clone());
                    }
                }
                Role::User => anthropic_messages.push(AnthropicMessage {
                    role: "user".to_string(),
                    content: msg.content.clone(),
                }),
                Role::Assistant => anthropic_messages.push(AnthropicMessage {
                    role: "assistant".to_string(),
                    content: msg.content.clone(),
                }),
            }
        }

        (system_prompt, anthropic_messages)
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = self.default_params.resolve(&self.default_model, &inv);
        if model.is_empty() {
            return Err(LlmError::Misconfiguration(
                "Anthropic model not specified. Set [llm.anthropic] model = \"model-name\"."
                    .to_string(),
            ));
        }

        debug!(
            provider = "anthropic",
            model = %model,
            step = %inv.step,
            max_tokens = params.max_tokens,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let (system_prompt, anthropic_messages) = Self::convert_messages(&inv.messages);

        let request_body = AnthropicRequest {
            model: model.clone(),
            messages: anthropic_messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            system: system_prompt,
        };

        let request = reqwest::Client::new()
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body);

        let response = self
            .client
            .execute(request, inv.timeout, "anthropic")
            .await?;

        let response_body: AnthropicResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!("Failed to parse Anthropic response: {e}"))
        })?;

        if response_body.stop_reason.as_deref() == Some("refusal") {
            return Err(LlmError::ContentRejected(
                "Anthropic refused to complete the request".to_string(),
            ));
        }

        let content: String = response_body
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.is_empty() {
            return Err(LlmError::Transport(
                "Anthropic response missing text content".to_string(),
            ));
        }

        let mut result = LlmResult::new(content, "anthropic", model);
        if let Some(usage) = response_body.usage {
            result = result.with_tokens(usage.input_tokens, usage.output_tokens);
        }

        debug!(
            provider = "anthropic",
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Anthropic invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_messages_separates_system() {
        let messages = vec![
            Message::system("You are an architect"),
            Message::system("Reply with JSON"),
            Message::user("Plan a to-do app"),
            Message::assistant("{}"),
        ];

        let (system, converted) = AnthropicBackend::convert_messages(&messages);

        assert_eq!(
            system,
            Some("You are an architect\n\nReply with JSON".to_string())
        );
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[1].role, "assistant");
    }

    #[test]
    fn test_convert_messages_no_system() {
        let (system, converted) =
            AnthropicBackend::convert_messages(&[Message::user("Hello")]);
        assert_eq!(system, None);
        assert_eq!(converted.len(), 1);
    }

    #[test]
    fn test_new_from_config_missing_api_key() {
        let config = ProviderConfig {
            api_key_env: Some("APPFORGE_TEST_ANTHROPIC_KEY_NEVER_SET".to_string()),
            model: Some("test-model".to_string()),
            ..ProviderConfig::default()
        };

        match AnthropicBackend::new_from_config(Some(&config)) {
            Err(LlmError::Misconfiguration(msg)) => {
                assert!(msg.contains("APPFORGE_TEST_ANTHROPIC_KEY_NEVER_SET"));
                assert!(msg.contains("not found"));
            }
            _ => panic!("Expected Misconfiguration error for missing API key"),
        }
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "content": [{"type": "text", "text": "{\"files\": []}"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 5}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.content[0].text.as_deref(), Some("{\"files\": []}"));
        assert_eq!(parsed.usage.unwrap().output_tokens, 5);
    }
}
