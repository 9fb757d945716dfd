//! Shared HTTP client infrastructure for HTTP-based providers
//!
//! One `reqwest::Client` per backend, configured once and reused. Each call
//! is a single attempt; status codes are mapped onto `LlmError` so the
//! caller can classify and retry.

use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use appforge_utils::error::LlmError;
use appforge_utils::redaction::redact_error_message;

/// Default maximum HTTP timeout (5 minutes)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Default connect timeout (30 seconds)
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self, LlmError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
        })
    }

    /// Execute one HTTP request with timeout `min(request_timeout, max_timeout)`.
    ///
    /// - 401/403 → `ProviderAuth`
    /// - 429 → `ProviderQuota`
    /// - other 4xx → `InvalidRequest`
    /// - 5xx → `ProviderOutage`
    /// - timeout → `Timeout`
    /// - network failure → `Transport`
    pub async fn execute(
        &self,
        request_builder: reqwest::RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, LlmError> {
        let effective_timeout = request_timeout.min(self.max_timeout);

        let request = request_builder
            .timeout(effective_timeout)
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to build request: {e}")))?;

        debug!(
            provider = provider_name,
            timeout_secs = effective_timeout.as_secs(),
            "Executing HTTP request"
        );

        match self.client.execute(request).await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }
                let body = response.text().await.unwrap_or_default();
                Err(map_status(status, provider_name, &body))
            }
            Err(e) if e.is_timeout() => Err(LlmError::Timeout {
                duration: effective_timeout,
            }),
            Err(e) => Err(LlmError::Transport(format!(
                "{provider_name} request failed: {}",
                redact_error_message(&e.to_string())
            ))),
        }
    }
}

/// Map a non-success HTTP status onto an `LlmError` variant.
pub(crate) fn map_status(status: StatusCode, provider_name: &str, body: &str) -> LlmError {
    let detail = summarize_body(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::ProviderAuth(format!("{provider_name} authentication failed: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            LlmError::ProviderQuota(format!("{provider_name} rate limit exceeded: {status}"))
        }
        s if s.is_server_error() => {
            LlmError::ProviderOutage(format!("{provider_name} returned server error: {status}"))
        }
        _ => LlmError::InvalidRequest(format!(
            "{provider_name} rejected the request: {status}{detail}"
        )),
    }
}

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut snippet: String = trimmed.chars().take(200).collect();
    if trimmed.chars().count() > 200 {
        snippet.push('…');
    }
    format!(" ({})", redact_error_message(&snippet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_utils::error::{Classify, FailureClass};

    #[test]
    fn test_http_client_construction() {
        assert!(HttpClient::new().is_ok());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, "anthropic", ""),
            LlmError::ProviderAuth(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, "anthropic", ""),
            LlmError::ProviderQuota(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_GATEWAY, "openai", ""),
            LlmError::ProviderOutage(_)
        ));
        assert!(matches!(
            map_status(StatusCode::BAD_REQUEST, "openai", "{\"error\":\"bad\"}"),
            LlmError::InvalidRequest(_)
        ));
    }

    #[test]
    fn test_status_classes() {
        let transient = map_status(StatusCode::SERVICE_UNAVAILABLE, "p", "");
        assert_eq!(transient.failure_class(), FailureClass::Transient);
        let rejected = map_status(StatusCode::UNPROCESSABLE_ENTITY, "p", "");
        assert_eq!(rejected.failure_class(), FailureClass::Rejected);
    }

    #[test]
    fn test_body_is_truncated_and_redacted() {
        let body = format!("key sk-{} {}", "a".repeat(40), "x".repeat(400));
        let err = map_status(StatusCode::BAD_REQUEST, "openai", &body);
        let text = err.to_string();
        assert!(!text.contains(&"a".repeat(40)));
        assert!(text.len() < 400);
    }
}
