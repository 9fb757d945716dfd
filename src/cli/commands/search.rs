//! Search command implementation

use anyhow::{Context, Result};

use appforge_utils::types::Platform;

use crate::{AppForgeError, Config, ExitCode, emit_jcs};

/// Execute the search command against the configured retrieval backend.
pub async fn execute_search_command(
    query: &str,
    platform: Platform,
    top_k: Option<usize>,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let client = appforge_retrieval::from_config(config).map_err(AppForgeError::from)?;
    let top_k = top_k.unwrap_or(config.workflow.top_k);
    let snippets = client
        .search(query, platform, top_k)
        .await
        .map_err(AppForgeError::from)?;

    if json {
        println!("{}", emit_jcs(&snippets).context("Failed to emit search JSON")?);
        return Ok(ExitCode::SUCCESS);
    }

    if snippets.is_empty() {
        println!("No {platform} documentation matched \"{query}\" ({} backend)", client.name());
    }
    for (rank, snippet) in snippets.iter().enumerate() {
        let preview: String = snippet.text.chars().take(160).collect();
        println!(
            "{}. [{:.3}] {}\n   {}",
            rank + 1,
            snippet.score,
            snippet.source,
            preview.replace('\n', " ")
        );
    }
    Ok(ExitCode::SUCCESS)
}
