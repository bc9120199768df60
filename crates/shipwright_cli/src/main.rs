//! Shipwright CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Job or validation failure
//! - 4: Template error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use shipwright_core::CoreError;

mod commands;

use commands::{Cli, Commands, CommandFailure};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const JOB_FAILURE: u8 = 3;
    pub const TEMPLATE_ERROR: u8 = 4;
}

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "shipwright=info,warn";
const VERBOSE_FILTER: &str = "shipwright=debug,info";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.config.as_deref()).await,
        Commands::ParseLog(args) => commands::parse_log::execute(args).await,
        Commands::ApplyDiff(args) => commands::apply_diff::execute(args).await,
        Commands::Validate(args) => commands::validate::execute(args, cli.config.as_deref()).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(categorize_error(&e))
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    // A second initialization (tests, embedding) is harmless
    let _ = if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init()
    };
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if e.chain().any(|c| c.is::<CommandFailure>()) {
        return ExitCodes::JOB_FAILURE;
    }
    if e.chain().any(|c| c.is::<shipwright_templates::TemplateError>()) {
        return ExitCodes::TEMPLATE_ERROR;
    }
    let bad_input = e.chain().any(|c| {
        c.downcast_ref::<std::io::Error>()
            .map_or(false, |io| io.kind() == std::io::ErrorKind::NotFound)
            || c.is::<serde_json::Error>()
            || matches!(
                c.downcast_ref::<CoreError>(),
                Some(CoreError::Config(_) | CoreError::InvalidPath(_) | CoreError::Toml(_))
            )
    });
    if bad_input {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
