//! Result normalization shared by every retrieval backend

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::types::SnippetRef;

/// Bring raw backend results into contract shape.
///
/// Scores are clamped to `[0, 1]` and non-finite scores are dropped.
/// Snippets below `min_relevance` are removed, duplicates (same source and
/// text) keep their first occurrence, and the rest is sorted by descending
/// score with `source` as the tie-breaker before truncating to `top_k`.
#[must_use]
pub fn normalize_results(
    raw: Vec<SnippetRef>,
    min_relevance: f32,
    top_k: usize,
) -> Vec<SnippetRef> {
    let mut seen = HashSet::new();
    let mut results: Vec<SnippetRef> = raw
        .into_iter()
        .filter(|s| s.score.is_finite())
        .map(|mut s| {
            s.score = s.score.clamp(0.0, 1.0);
            s
        })
        .filter(|s| s.score >= min_relevance)
        .filter(|s| seen.insert((s.source.clone(), s.text.clone())))
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.source.cmp(&b.source))
    });
    results.truncate(top_k);
    results
}
