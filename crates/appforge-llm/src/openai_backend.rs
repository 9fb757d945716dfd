//! OpenAI-compatible HTTP backend implementation
//!
//! Speaks the Chat Completions wire format, so any compatible endpoint
//! (OpenAI, DeepSeek, local gateways) works by changing `base_url`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use appforge_config::ProviderConfig;
use appforge_utils::error::LlmError;

use crate::http_client::HttpClient;
use crate::types::{HttpParams, LlmBackend, LlmInvocation, LlmResult, Message, Role};

/// Default OpenAI API endpoint
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";

const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Clone)]
pub(crate) struct OpenAiBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

impl OpenAiBackend {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            default_params,
        })
    }

    /// Create a backend from `[llm.openai]`.
    pub fn new_from_config(config: Option<&ProviderConfig>) -> Result<Self, LlmError> {
        let api_key_env = config
            .and_then(|c| c.api_key_env.as_deref())
            .unwrap_or(DEFAULT_API_KEY_ENV);

        let api_key = std::env::var(api_key_env).map_err(|_| {
            LlmError::Misconfiguration(format!(
                "OpenAI API key not found in environment variable '{api_key_env}'. \
                 Please set this variable or configure a different api_key_env in [llm.openai]."
            ))
        })?;

        let defaults = HttpParams::default();
        let default_params = HttpParams {
            max_tokens: config
                .and_then(|c| c.max_tokens)
                .unwrap_or(defaults.max_tokens),
            temperature: config
                .and_then(|c| c.temperature)
                .unwrap_or(defaults.temperature),
        };

        Self::new(
            api_key,
            config.and_then(|c| c.base_url.clone()),
            config.and_then(|c| c.model.clone()).unwrap_or_default(),
            default_params,
        )
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| ChatMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                }
                .to_string(),
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = self.default_params.resolve(&self.default_model, &inv);
        if model.is_empty() {
            return Err(LlmError::Misconfiguration(
                "OpenAI model not specified. Set [llm.openai] model = \"model-name\".".to_string(),
            ));
        }

        debug!(
            provider = "openai",
            model = %model,
            step = %inv.step,
            max_tokens = params.max_tokens,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking OpenAI-compatible backend"
        );

        let request_body = ChatRequest {
            model: model.clone(),
            messages: Self::convert_messages(&inv.messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let request = reqwest::Client::new()
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&request_body);

        let response = self.client.execute(request, inv.timeout, "openai").await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to parse OpenAI response: {e}")))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Transport("OpenAI response has no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(LlmError::ContentRejected(
                "OpenAI content filter blocked the completion".to_string(),
            ));
        }

        let content = choice.message.content.unwrap_or_default();
        if content.is_empty() {
            return Err(LlmError::Transport(
                "OpenAI response missing message content".to_string(),
            ));
        }

        let mut result = LlmResult::new(content, "openai", body.model.unwrap_or(model));
        if let Some(usage) = body.usage {
            result = result.with_tokens(usage.prompt_tokens, usage.completion_tokens);
        }
        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
