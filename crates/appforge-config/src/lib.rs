//! Configuration management for appforge
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > file > defaults. Supports TOML configuration files with
//! `[workflow]`, `[retries.*]`, `[retrieval]` and `[llm]` sections.

mod builder;
mod discovery;
mod model;
mod validation;

use std::path::PathBuf;

pub use builder::ConfigBuilder;
pub use discovery::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, HOME_ENV};
pub use model::*;

pub use appforge_utils::types::ConfigSource;

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub llm_provider: Option<String>,
    pub concurrency_limit: Option<usize>,
    pub call_timeout_secs: Option<u64>,
    pub top_k: Option<usize>,
    pub corpus_dir: Option<PathBuf>,
}
