//! Client for a remote vector-search service
//!
//! `POST {base_url}/search` with `{query, platform, top_k}`; the service
//! answers `{results: [{source, score, text}]}`. Results pass through
//! [`normalize_results`] so the remote side cannot break ordering or bounds.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use appforge_utils::error::RetrievalError;
use appforge_utils::redaction::redact_error_message;
use appforge_utils::types::Platform;

use crate::normalize::normalize_results;
use crate::types::{RetrievalClient, SnippetRef};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    platform: Platform,
    top_k: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    source: String,
    score: f32,
    text: String,
}

pub struct HttpRetrievalClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    min_relevance: f32,
}

impl HttpRetrievalClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        min_relevance: f32,
    ) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| RetrievalError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
            min_relevance,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/search", self.base_url)
    }
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn search(
        &self,
        query: &str,
        platform: Platform,
        top_k: usize,
    ) -> Result<Vec<SnippetRef>, RetrievalError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .timeout(self.timeout)
            .json(&SearchRequest {
                query,
                platform,
                top_k,
            });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::Timeout {
                    duration: self.timeout,
                }
            } else {
                RetrievalError::Transport(redact_error_message(&e.to_string()))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status));
        }

        let body: SearchResponse = response.json().await.map_err(|e| {
            RetrievalError::Transport(format!("invalid search response: {e}"))
        })?;

        let raw = body
            .results
            .into_iter()
            .map(|hit| SnippetRef::new(platform, hit.source, hit.score, hit.text))
            .collect();
        let results = normalize_results(raw, self.min_relevance, top_k);
        debug!(platform = %platform, hits = results.len(), "Remote search complete");
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

fn map_status(status: StatusCode) -> RetrievalError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RetrievalError::Unauthorized(status.to_string())
        }
        StatusCode::TOO_MANY_REQUESTS => RetrievalError::RateLimited(status.to_string()),
        s if s.is_server_error() => RetrievalError::Unavailable(status.to_string()),
        _ => RetrievalError::InvalidQuery(status.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_utils::error::Classify;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client =
            HttpRetrievalClient::new("http://localhost:8080/", None, Duration::from_secs(1), 0.2)
                .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:8080/search");
    }

    #[test]
    fn test_status_mapping_classes() {
        assert!(map_status(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(map_status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!map_status(StatusCode::BAD_REQUEST).is_transient());
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN),
            RetrievalError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(SearchRequest {
            query: "routing",
            platform: Platform::Server,
            top_k: 3,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"query": "routing", "platform": "server", "top_k": 3})
        );
    }
}
