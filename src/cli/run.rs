//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Initializes tracing
//! - Builds CliArgs and discovers Config
//! - Creates the tokio runtime
//! - Dispatches to command handlers
//! - Handles all error output

use clap::Parser;

use super::args::{Cli, Commands};
use super::commands;

use crate::{AppForgeError, CliArgs, Config, ExitCode};
use appforge_utils::logging::{LogFormat, init_tracing};

/// Provider used by `--dry-run`.
const DRY_RUN_PROVIDER: &str = "stub";

/// Translate parsed flags into configuration overrides.
pub(crate) fn cli_args_from(cli: &Cli) -> CliArgs {
    let dry_run = matches!(cli.command, Commands::Generate { dry_run: true, .. });
    CliArgs {
        config_path: cli.config.clone(),
        llm_provider: if dry_run {
            Some(DRY_RUN_PROVIDER.to_string())
        } else {
            cli.llm_provider.clone()
        },
        concurrency_limit: cli.concurrency,
        call_timeout_secs: cli.call_timeout,
        top_k: None,
        corpus_dir: cli.corpus_dir.clone(),
    }
}

/// Main CLI execution function.
///
/// This function handles ALL output including errors. It returns
/// `Result<(), ExitCode>`; main.rs only maps the code to the process exit.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(LogFormat::from_flags(cli.verbose, cli.log_json)) {
        eprintln!("warning: could not initialize logging: {e}");
    }

    let cli_args = cli_args_from(&cli);
    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            let err = AppForgeError::from(err);
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = cli.command.operation();
    let result = rt.block_on(async {
        match cli.command {
            Commands::Generate {
                request,
                out,
                json,
                dry_run: _,
            } => {
                let request = commands::read_request(request)?;
                commands::execute_generate_command(&request, out.as_deref(), json, config).await
            }
            Commands::Search {
                query,
                platform,
                top_k,
                json,
            } => commands::execute_search_command(&query, platform, top_k, json, &config).await,
            Commands::Config { json } => commands::execute_config_command(&config, json),
        }
    });

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(err) => {
            let code = match err.downcast_ref::<AppForgeError>() {
                Some(app_err) => {
                    eprintln!("{}", app_err.display_for_user());
                    app_err.to_exit_code()
                }
                None => {
                    eprintln!("error: {operation} failed: {err:#}");
                    ExitCode::INTERNAL
                }
            };
            Err(code)
        }
    }
}
