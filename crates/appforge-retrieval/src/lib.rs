//! Retrieval Client for appforge
//!
//! Searches framework documentation by query and platform. Two backends: an
//! in-process corpus loaded from `*.jsonl` files, and a remote vector-search
//! service over HTTP.

mod http;
mod memory;
mod normalize;
mod types;

use std::env;
use std::sync::Arc;
use tracing::warn;

use appforge_config::{Config, RetrievalBackendKind};
use appforge_utils::error::RetrievalError;

pub use http::HttpRetrievalClient;
pub use memory::{CorpusRecord, InMemoryCorpus};
pub use normalize::normalize_results;
pub use types::{RetrievalClient, SnippetRef};

/// Construct the retrieval client selected by `[retrieval] backend`.
///
/// The memory backend without a `corpus_dir` yields an empty corpus, so
/// every search returns no snippets and generation proceeds without
/// documentation context.
pub fn from_config(config: &Config) -> Result<Arc<dyn RetrievalClient>, RetrievalError> {
    let retrieval = &config.retrieval;
    match retrieval.backend {
        RetrievalBackendKind::Memory => match &retrieval.corpus_dir {
            Some(dir) => Ok(Arc::new(InMemoryCorpus::load_dir(
                dir,
                retrieval.min_relevance,
            )?)),
            None => {
                warn!("No [retrieval] corpus_dir configured; documentation context will be empty");
                Ok(Arc::new(InMemoryCorpus::empty()))
            }
        },
        RetrievalBackendKind::Http => {
            let base_url = retrieval.base_url.clone().ok_or_else(|| {
                RetrievalError::InvalidQuery("[retrieval] base_url is required for the http backend".into())
            })?;
            let api_key = match &retrieval.api_key_env {
                Some(var) => Some(env::var(var).map_err(|_| {
                    RetrievalError::Unauthorized(format!("environment variable {var} is not set"))
                })?),
                None => None,
            };
            Ok(Arc::new(HttpRetrievalClient::new(
                base_url,
                api_key,
                config.workflow.call_timeout(),
                retrieval.min_relevance,
            )?))
        }
    }
}
