//! In-process documentation corpus
//!
//! Documents are scored against the query with cosine similarity over term
//! frequencies. Scoring is deterministic, so repeated searches return the
//! same ordered results.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use appforge_utils::error::RetrievalError;
use appforge_utils::types::Platform;

use crate::normalize::normalize_results;
use crate::types::{RetrievalClient, SnippetRef};

/// One documentation chunk as stored in a `*.jsonl` corpus file.
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusRecord {
    pub platform: Platform,
    pub url: String,
    #[serde(default)]
    pub chunk_number: u32,
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
}

struct IndexedDoc {
    record: CorpusRecord,
    terms: HashMap<String, f32>,
    norm: f32,
}

/// Corpus held in memory and searched locally.
pub struct InMemoryCorpus {
    docs: Vec<IndexedDoc>,
    min_relevance: f32,
}

impl InMemoryCorpus {
    pub fn new(records: Vec<CorpusRecord>, min_relevance: f32) -> Self {
        let docs = records
            .into_iter()
            .map(|record| {
                let mut text = record.content.clone();
                if let Some(title) = &record.title {
                    text.push(' ');
                    text.push_str(title);
                }
                let terms = term_frequencies(&text);
                let norm = vector_norm(&terms);
                IndexedDoc {
                    record,
                    terms,
                    norm,
                }
            })
            .collect();
        Self {
            docs,
            min_relevance,
        }
    }

    /// Corpus with no documents. Every search returns an empty result.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0.0)
    }

    /// Load every `*.jsonl` file in `dir`, in file-name order.
    ///
    /// Blank lines are skipped. A malformed line fails the whole load with
    /// its file and line number.
    pub fn load_dir(dir: &Path, min_relevance: f32) -> Result<Self, RetrievalError> {
        let load_err = |reason: String| RetrievalError::CorpusLoad {
            path: dir.display().to_string(),
            reason,
        };

        let entries = fs::read_dir(dir).map_err(|e| load_err(e.to_string()))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jsonl"))
            .collect();
        files.sort();

        let mut records = Vec::new();
        for file in &files {
            let content = fs::read_to_string(file).map_err(|e| RetrievalError::CorpusLoad {
                path: file.display().to_string(),
                reason: e.to_string(),
            })?;
            for (idx, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let record: CorpusRecord =
                    serde_json::from_str(line).map_err(|e| RetrievalError::CorpusLoad {
                        path: file.display().to_string(),
                        reason: format!("line {}: {e}", idx + 1),
                    })?;
                records.push(record);
            }
        }

        info!(
            dir = %dir.display(),
            files = files.len(),
            documents = records.len(),
            "Loaded documentation corpus"
        );
        Ok(Self::new(records, min_relevance))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn score(&self, query: &HashMap<String, f32>, query_norm: f32, doc: &IndexedDoc) -> f32 {
        if query_norm == 0.0 || doc.norm == 0.0 {
            return 0.0;
        }
        let dot: f32 = query
            .iter()
            .filter_map(|(term, weight)| doc.terms.get(term).map(|w| w * weight))
            .sum();
        dot / (query_norm * doc.norm)
    }
}

impl Default for InMemoryCorpus {
    fn default() -> Self {
        Self::empty()
    }
}

#[async_trait]
impl RetrievalClient for InMemoryCorpus {
    async fn search(
        &self,
        query: &str,
        platform: Platform,
        top_k: usize,
    ) -> Result<Vec<SnippetRef>, RetrievalError> {
        let query_terms = term_frequencies(query);
        let query_norm = vector_norm(&query_terms);

        let raw: Vec<SnippetRef> = self
            .docs
            .iter()
            .filter(|d| d.record.platform == platform)
            .map(|d| {
                SnippetRef::new(
                    platform,
                    format!("{}#{}", d.record.url, d.record.chunk_number),
                    self.score(&query_terms, query_norm, d),
                    d.record.content.clone(),
                )
            })
            .collect();

        let results = normalize_results(raw, self.min_relevance, top_k);
        debug!(
            platform = %platform,
            top_k = top_k,
            hits = results.len(),
            "In-memory corpus search"
        );
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut terms = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
    {
        *terms.entry(word.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

fn vector_norm(terms: &HashMap<String, f32>) -> f32 {
    terms.values().map(|w| w * w).sum::<f32>().sqrt()
}
