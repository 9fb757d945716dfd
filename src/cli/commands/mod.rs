//! CLI command implementations (facade).
//!
//! Each handler returns the process exit code on completion; errors are
//! reported by `run.rs`.

pub(crate) mod config;
mod generate;
mod search;

pub use config::execute_config_command;
pub use generate::{execute_generate_command, read_request};
pub use search::execute_search_command;
