//! Binary-level CLI tests
//!
//! Runs the built `appforge` binary with the stub provider in a scratch
//! directory. Each test points `--config` at its own file so no user-level
//! configuration leaks in.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const FAST_CONFIG: &str = r#"
[workflow]
initial_backoff_ms = 0
max_backoff_ms = 0
top_k = 3
"#;

fn scratch() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, FAST_CONFIG).unwrap();
    (dir, config)
}

fn appforge(dir: &Path, config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("appforge"));
    cmd.current_dir(dir)
        .env("APPFORGE_HOME", dir)
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config);
    cmd
}

#[test]
fn dry_run_generates_and_exports_project() {
    let (dir, config) = scratch();
    let out = dir.path().join("todo");

    appforge(dir.path(), &config)
        .args(["generate", "a simple to-do list app for web and mobile", "--dry-run"])
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains(": done"))
        .stdout(predicate::str::contains("Wrote"));

    assert!(out.join("web/src/index.js").is_file());
    assert!(out.join("web/package.json").is_file());
    assert!(out.join("mobile/app.js").is_file());
    assert!(out.join("README.md").is_file());
    assert!(
        fs::read_to_string(out.join(".gitignore"))
            .unwrap()
            .contains("node_modules/")
    );
    let env = fs::read_to_string(out.join(".env.example")).unwrap();
    assert!(env.contains("REACT_APP_API_URL="));
    assert!(!env.contains("ELECTRON_START_URL"));

    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(out.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest["status"], "done");
    assert!(
        manifest["files"]
            .as_array()
            .unwrap()
            .iter()
            .any(|f| f["path"] == "web/src/index.js")
    );
    assert!(
        manifest["files"]
            .as_array()
            .unwrap()
            .iter()
            .any(|f| f["path"] == ".env.example")
    );
}

#[test]
fn json_output_is_the_final_state() {
    let (dir, config) = scratch();

    let output = appforge(dir.path(), &config)
        .args(["generate", "a notes api server", "--dry-run", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let state: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(state["status"], "done");
    assert_eq!(state["platforms"], serde_json::json!(["server"]));
    assert!(state["files"]["server"]["server.js"].is_string());
}

#[test]
fn request_is_read_from_stdin() {
    let (dir, config) = scratch();

    appforge(dir.path(), &config)
        .args(["generate", "--dry-run"])
        .write_stdin("a desktop timer\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("desktop"));
}

#[test]
fn empty_request_exits_unactionable() {
    let (dir, config) = scratch();

    appforge(dir.path(), &config)
        .args(["generate", "   ", "--dry-run"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("user_input_unactionable"));
}

#[test]
fn failed_run_writes_nothing() {
    let (dir, config) = scratch();
    let out = dir.path().join("nothing");

    appforge(dir.path(), &config)
        .args(["generate", "", "--dry-run"])
        .arg("--out")
        .arg(&out)
        .assert()
        .code(3);

    assert!(!out.exists());
}

#[test]
fn invalid_config_file_exits_with_config_error() {
    let (dir, config) = scratch();
    fs::write(&config, "[workflow]\nconcurrency_limit = 0\n").unwrap();

    appforge(dir.path(), &config)
        .args(["generate", "a todo app", "--dry-run"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("concurrency_limit"));
}

#[test]
fn config_command_reports_sources() {
    let (dir, config) = scratch();

    let output = appforge(dir.path(), &config)
        .args(["--concurrency", "3", "config", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let entries: Vec<Value> = serde_json::from_slice(&output).unwrap();
    let source_of = |key: &str| {
        entries
            .iter()
            .find(|e| e["key"] == key)
            .map(|e| e["source"].as_str().unwrap().to_string())
            .unwrap()
    };
    assert_eq!(source_of("workflow.concurrency_limit"), "cli");
    assert_eq!(source_of("workflow.top_k"), "config");
    assert_eq!(source_of("workflow.max_transitions"), "default");
}

#[test]
fn unknown_platform_is_a_usage_error() {
    let (dir, config) = scratch();

    appforge(dir.path(), &config)
        .args(["search", "routing", "--platform", "tv"])
        .assert()
        .code(2);
}

#[test]
fn search_without_corpus_is_empty_not_an_error() {
    let (dir, config) = scratch();

    appforge(dir.path(), &config)
        .args(["search", "routing", "--platform", "web"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No web documentation matched"));
}
