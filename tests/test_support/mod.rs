//! Shared helpers for workflow integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use appforge::llm::{LlmBackend, LlmRouter, ScriptedBackend};
use appforge::retrieval::{CorpusRecord, InMemoryCorpus, RetrievalClient};
use appforge::{Config, ConfigBuilder, Orchestrator, Platform, Services};

/// Builder with zero backoff so retry paths run instantly.
pub(crate) fn fast_config() -> ConfigBuilder {
    Config::builder().backoff(Duration::ZERO, Duration::ZERO)
}

pub(crate) fn orchestrator_with(
    config: Config,
    backend: ScriptedBackend,
    retrieval: Arc<dyn RetrievalClient>,
) -> Orchestrator {
    let backend: Arc<dyn LlmBackend> = Arc::new(backend);
    Orchestrator::new(Services {
        config,
        llm: LlmRouter::single("scripted", backend),
        retrieval,
    })
}

/// Orchestrator over `backend` with an empty documentation corpus.
pub(crate) fn orchestrator(backend: ScriptedBackend) -> Orchestrator {
    orchestrator_with(
        fast_config().build().unwrap(),
        backend,
        Arc::new(InMemoryCorpus::empty()),
    )
}

/// Small corpus with documentation for `platforms` only.
pub(crate) fn corpus(platforms: &[Platform]) -> InMemoryCorpus {
    let records = platforms
        .iter()
        .flat_map(|platform| {
            let name = platform.as_str();
            [
                CorpusRecord {
                    platform: *platform,
                    url: format!("https://docs.example/{name}/getting-started"),
                    chunk_number: 0,
                    title: Some(format!("{name} getting started")),
                    content: format!("Create a {name} app with a list of tasks and persistent data."),
                },
                CorpusRecord {
                    platform: *platform,
                    url: format!("https://docs.example/{name}/state"),
                    chunk_number: 1,
                    title: None,
                    content: "Keep user flow state in one place and persist data locally.".to_string(),
                },
            ]
        })
        .collect();
    InMemoryCorpus::new(records, 0.0)
}

/// A valid `{files:[...]}` generation reply.
pub(crate) fn files_reply(files: &[(&str, &str)]) -> String {
    let files: Vec<serde_json::Value> = files
        .iter()
        .map(|(path, content)| serde_json::json!({ "path": path, "content": content }))
        .collect();
    serde_json::json!({ "files": files }).to_string()
}
