//! CLI tests module
//!
//! Tests for argument parsing, flag-to-config translation and the config
//! listing.

use super::run::cli_args_from;
use super::*;
use crate::Config;
use clap::Parser;
use std::path::PathBuf;

use appforge_utils::types::{ConfigSource, Platform};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("appforge").chain(args.iter().copied())).unwrap()
}

#[test]
fn test_cli_definition_is_consistent() {
    build_cli().debug_assert();
}

#[test]
fn test_generate_flags() {
    let cli = parse(&["generate", "a todo app", "--out", "todo", "--json"]);
    match cli.command {
        Commands::Generate {
            request,
            out,
            json,
            dry_run,
        } => {
            assert_eq!(request.as_deref(), Some("a todo app"));
            assert_eq!(out, Some(PathBuf::from("todo")));
            assert!(json);
            assert!(!dry_run);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_dry_run_forces_stub_provider() {
    let cli = parse(&["--llm-provider", "openai", "generate", "x", "--dry-run"]);
    assert_eq!(cli_args_from(&cli).llm_provider.as_deref(), Some("stub"));

    let cli = parse(&["--llm-provider", "openai", "generate", "x"]);
    assert_eq!(cli_args_from(&cli).llm_provider.as_deref(), Some("openai"));
}

#[test]
fn test_global_overrides_are_forwarded() {
    let cli = parse(&[
        "config",
        "--concurrency",
        "4",
        "--call-timeout",
        "30",
        "--corpus-dir",
        "docs",
    ]);
    let args = cli_args_from(&cli);
    assert_eq!(args.concurrency_limit, Some(4));
    assert_eq!(args.call_timeout_secs, Some(30));
    assert_eq!(args.corpus_dir, Some(PathBuf::from("docs")));
}

#[test]
fn test_search_parses_platform_aliases() {
    let cli = parse(&["search", "routing", "--platform", "react", "--top-k", "3"]);
    match cli.command {
        Commands::Search {
            platform, top_k, ..
        } => {
            assert_eq!(platform, Platform::Web);
            assert_eq!(top_k, Some(3));
        }
        other => panic!("unexpected command: {other:?}"),
    }
    assert!(Cli::try_parse_from(["appforge", "search", "q", "--platform", "tv"]).is_err());
}

#[test]
fn test_config_entries_carry_sources() {
    let config = Config::builder().concurrency_limit(3).build().unwrap();
    let entries = commands::config::config_entries(&config);

    let concurrency = entries
        .iter()
        .find(|e| e.key == "workflow.concurrency_limit")
        .unwrap();
    assert_eq!(concurrency.value, "3");
    assert_eq!(concurrency.source, ConfigSource::Programmatic);

    let top_k = entries.iter().find(|e| e.key == "workflow.top_k").unwrap();
    assert_eq!(top_k.source, ConfigSource::Default);
    assert!(entries.iter().any(|e| e.key == "retries.generation"));
    assert!(entries.iter().any(|e| e.key == "llm.steps.planning"));
}
