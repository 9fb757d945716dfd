//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and all subcommand enums.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use appforge_utils::types::Platform;

/// appforge - turn an app description into per-platform source trees
#[derive(Parser, Debug)]
#[command(name = "appforge")]
#[command(about = "Plan, design and generate applications for web, desktop, mobile and server")]
#[command(long_about = r#"
appforge runs a multi-step workflow over a natural-language app description:
planning, platform selection, architecture design, per-platform code
generation and assembly. Each platform is generated independently, so one
failing platform does not stop the others.

EXAMPLES:
  # Generate a to-do app for web and mobile into ./todo
  appforge generate "a simple to-do list app for web and mobile" --out todo

  # Read the request from stdin and print the final state as JSON
  echo "a notes api for node" | appforge generate --json

  # Run offline with the stub provider (no network calls)
  appforge generate "a desktop timer" --dry-run

  # Search the documentation corpus
  appforge search "routing" --platform web --top-k 3

  # Show the effective configuration and where each value came from
  appforge config

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .appforge/config.toml
  Use --config to specify an explicit config file path

EXIT CODES:
  0 success, 1 internal error, 2 configuration, 3 unactionable request,
  4 no platforms, 5 provider failure, 6 assembly failed, 130 cancelled
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// LLM provider for every step (anthropic, openai, stub)
    #[arg(long, global = true)]
    pub llm_provider: Option<String>,

    /// Maximum number of platforms generated concurrently
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Timeout for each remote call, in seconds
    #[arg(long, global = true)]
    pub call_timeout: Option<u64>,

    /// Directory of `*.jsonl` documentation files for the in-memory corpus
    #[arg(long, global = true)]
    pub corpus_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the workflow for an app description
    ///
    /// EXAMPLES:
    ///   appforge generate "a recipe sharing app for web" --out recipes
    ///   cat idea.txt | appforge generate --json
    Generate {
        /// App description; read from stdin when omitted or `-`
        request: Option<String>,

        /// Directory to write the generated project into
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the final project state as canonical JSON
        #[arg(long)]
        json: bool,

        /// Use the offline stub provider instead of a hosted model
        #[arg(long)]
        dry_run: bool,
    },

    /// Search the documentation corpus
    Search {
        /// Query text
        query: String,

        /// Platform to search (web, desktop, mobile, server)
        #[arg(long)]
        platform: Platform,

        /// Number of snippets to return (defaults to `workflow.top_k`)
        #[arg(long)]
        top_k: Option<usize>,

        /// Print results as canonical JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration with value sources
    Config {
        /// Print as canonical JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Operation name used in error reports.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Generate { .. } => "generate",
            Self::Search { .. } => "search",
            Self::Config { .. } => "config",
        }
    }
}

/// Build the clap command (used by tests and completions).
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
