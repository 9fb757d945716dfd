use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use appforge_utils::error::RetrievalError;
use appforge_utils::types::Platform;

/// A retrieved documentation excerpt. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetRef {
    pub platform: Platform,
    /// Stable identifier of the source document (URL or file path).
    pub source: String,
    /// Relevance in `[0, 1]`.
    pub score: f32,
    pub text: String,
}

impl SnippetRef {
    pub fn new(
        platform: Platform,
        source: impl Into<String>,
        score: f32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            source: source.into(),
            score,
            text: text.into(),
        }
    }
}

/// Documentation search consumed by the workflow.
///
/// Implementations return at most `top_k` snippets sorted by descending
/// score. Nothing above the relevance threshold is an empty vector, not an
/// error. Identical arguments against an unchanged corpus return the same
/// ordered results.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        platform: Platform,
        top_k: usize,
    ) -> Result<Vec<SnippetRef>, RetrievalError>;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}
