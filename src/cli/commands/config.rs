//! Config command implementation
//!
//! Prints every effective setting with the source it came from.

use anyhow::{Context, Result};
use serde::Serialize;

use appforge_config::RetryScope;
use appforge_utils::types::ConfigSource;

use crate::{Config, ExitCode, emit_jcs};

/// One effective setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub source: ConfigSource,
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "(unset)".to_string(), |v| v.to_string())
}

/// Effective settings in display order.
#[must_use]
pub fn config_entries(config: &Config) -> Vec<ConfigEntry> {
    let w = &config.workflow;
    let platforms: Vec<&str> = w.fallback_platforms.iter().map(|p| p.as_str()).collect();

    let mut entries: Vec<(String, String, &str)> = vec![
        ("workflow.concurrency_limit".into(), w.concurrency_limit.to_string(), "concurrency_limit"),
        ("workflow.call_timeout_secs".into(), w.call_timeout_secs.to_string(), "call_timeout_secs"),
        ("workflow.initial_backoff_ms".into(), w.initial_backoff_ms.to_string(), "initial_backoff_ms"),
        ("workflow.max_backoff_ms".into(), w.max_backoff_ms.to_string(), "max_backoff_ms"),
        ("workflow.max_transitions".into(), w.max_transitions.to_string(), "max_transitions"),
        ("workflow.fallback_platforms".into(), format!("[{}]", platforms.join(", ")), "fallback_platforms"),
        ("workflow.min_platforms".into(), w.min_platforms.to_string(), "min_platforms"),
        ("workflow.top_k".into(), w.top_k.to_string(), "top_k"),
    ];

    for scope in RetryScope::ALL {
        let bounds = config.retries.for_scope(scope);
        entries.push((
            format!("retries.{scope}"),
            format!(
                "transient_attempts={}, revision_attempts={}",
                bounds.transient_attempts, bounds.revision_attempts
            ),
            "retries",
        ));
    }

    let r = &config.retrieval;
    entries.extend([
        ("retrieval.backend".into(), r.backend.to_string(), "retrieval_backend"),
        (
            "retrieval.corpus_dir".into(),
            optional(r.corpus_dir.as_ref().map(|p| p.display())),
            "corpus_dir",
        ),
        ("retrieval.base_url".into(), optional(r.base_url.as_ref()), "retrieval_base_url"),
        ("retrieval.min_relevance".into(), r.min_relevance.to_string(), "min_relevance"),
    ]);

    let llm = &config.llm;
    entries.push(("llm.provider".into(), llm.provider_name().to_string(), "llm_provider"));
    entries.push(("llm.budget".into(), optional(llm.budget), "llm_budget"));
    for scope in RetryScope::ALL {
        entries.push((
            format!("llm.steps.{scope}"),
            format!(
                "{} ({})",
                llm.provider_for_step(scope),
                llm.model_for_step(scope).unwrap_or("default model")
            ),
            "llm_steps",
        ));
    }

    entries
        .into_iter()
        .map(|(key, value, attribution)| ConfigEntry {
            key,
            value,
            source: config.source_of(attribution),
        })
        .collect()
}

/// Execute the config command
pub fn execute_config_command(config: &Config, json: bool) -> Result<ExitCode> {
    let entries = config_entries(config);
    if json {
        println!("{}", emit_jcs(&entries).context("Failed to emit config JSON")?);
        return Ok(ExitCode::SUCCESS);
    }

    match &config.config_path {
        Some(path) => println!("# config file: {}", path.display()),
        None => println!("# no config file found; using defaults"),
    }
    let width = entries.iter().map(|e| e.key.len()).max().unwrap_or(0);
    for entry in &entries {
        println!("{:<width$} = {}  [{}]", entry.key, entry.value, entry.source);
    }
    Ok(ExitCode::SUCCESS)
}
