//! Retrieval idempotence against an on-disk corpus
//!
//! Identical searches against an unchanged corpus must return the same
//! ordered snippets, and two runs over the same request must ground
//! generation in the same documentation.

use std::fs;
use std::path::Path;

use appforge::retrieval::from_config;
use appforge::{Config, Orchestrator, Platform, WorkflowStatus};
use tempfile::TempDir;

const WEB_DOCS: &str = r#"{"platform":"web","url":"https://react.dev/learn","chunk_number":0,"title":"Quick start","content":"Components are functions that return markup. Keep todo list state with useState."}
{"platform":"web","url":"https://react.dev/learn","chunk_number":1,"content":"Render lists of items with map and give every item a key."}

{"platform":"web","url":"https://react.dev/reference/react-dom","chunk_number":0,"content":"createRoot lets you render React components inside a browser DOM node."}
"#;

const SERVER_DOCS: &str = r#"{"platform":"server","url":"https://expressjs.com/en/guide/routing.html","chunk_number":0,"title":"Routing","content":"Routing refers to how an application responds to a client request to an api endpoint."}
{"platform":"server","url":"https://expressjs.com/en/guide/database.html","chunk_number":0,"content":"Add persistent data storage to an express api with a database driver."}
"#;

fn write_corpus(dir: &Path) {
    fs::write(dir.join("react.jsonl"), WEB_DOCS).unwrap();
    fs::write(dir.join("express.jsonl"), SERVER_DOCS).unwrap();
    fs::write(dir.join("notes.txt"), "not part of the corpus").unwrap();
}

fn config_for(dir: &Path) -> Config {
    Config::builder()
        .corpus_dir(dir)
        .min_relevance(0.0)
        .llm_provider("stub")
        .build()
        .unwrap()
}

#[tokio::test]
async fn repeated_search_returns_identical_results() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());
    let client = from_config(&config_for(dir.path())).unwrap();

    let first = client.search("todo list state", Platform::Web, 5).await.unwrap();
    let second = client.search("todo list state", Platform::Web, 5).await.unwrap();

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert!(first.iter().all(|s| s.platform == Platform::Web));
    assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(first[0].source, "https://react.dev/learn#0");
}

#[tokio::test]
async fn search_honours_top_k_and_platform_scope() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());
    let client = from_config(&config_for(dir.path())).unwrap();

    let one = client.search("api routing", Platform::Server, 1).await.unwrap();
    assert_eq!(one.len(), 1);
    assert!(one[0].source.starts_with("https://expressjs.com/"));

    let mobile = client.search("todo list", Platform::Mobile, 5).await.unwrap();
    assert!(mobile.is_empty());
}

#[tokio::test]
async fn malformed_corpus_line_is_reported() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("broken.jsonl"), "{\"platform\":\"web\"}\n").unwrap();

    let err = from_config(&config_for(dir.path())).err().unwrap();
    assert!(err.to_string().contains("line 1"), "{err}");
}

#[tokio::test]
async fn runs_over_the_same_corpus_use_the_same_docs() {
    let dir = TempDir::new().unwrap();
    write_corpus(dir.path());

    let request = "a todo list app with a web frontend and an api server";
    let first = Orchestrator::from_config(config_for(dir.path()))
        .unwrap()
        .run(request)
        .await;
    let second = Orchestrator::from_config(config_for(dir.path()))
        .unwrap()
        .run(request)
        .await;

    assert_eq!(first.status, WorkflowStatus::Done, "{:?}", first.error);
    assert_eq!(second.status, WorkflowStatus::Done, "{:?}", second.error);
    assert_eq!(first.docs, second.docs);
    assert_eq!(first.files, second.files);
    assert!(!first.docs[&Platform::Web].is_empty());
    assert!(!first.docs[&Platform::Server].is_empty());
}
