//! Command-line interface for appforge
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions and parsing structures (clap)
//! - `run`: Main entry point and command dispatch
//! - `commands`: Command implementations and helpers

pub mod args;
mod commands;
mod run;

#[cfg(test)]
mod tests;

pub use args::{Cli, Commands, build_cli};
pub use run::run;
