//! cmdc - natural-language command runner for a remote host.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Remote or session failure
//! - 4: Configuration error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cmdc_pipeline::PipelineError;
use cmdc_runner::RunnerError;

mod commands;

use commands::{Cli, Commands};

/// Script-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const REMOTE_FAILURE: u8 = 3;
    pub const CONFIG_ERROR: u8 = 4;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Exec(args) => commands::exec::execute(args, config_path).await,
        Commands::Translate(args) => commands::translate::execute(args, config_path).await,
        Commands::Analyze(args) => commands::analyze::execute(args, config_path).await,
        Commands::Status(args) => commands::status::execute(args, config_path).await,
        Commands::Phrases(args) => commands::phrases::execute(args, config_path).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Logs go to stderr so command output on stdout stays clean.
fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "cmdc=debug,warn" } else { "cmdc=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let text = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let structured = json.then(|| fmt::layer().json().with_writer(std::io::stderr));

    // Already initialised in tests; keep going
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(structured)
        .try_init();
}

/// Map an error to its exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<PipelineError>() {
        return match err {
            PipelineError::EmptyInput => ExitCodes::INVALID_ARGS,
            err if err.is_config() => ExitCodes::CONFIG_ERROR,
            PipelineError::Busy { .. } | PipelineError::NothingRunning | PipelineError::Runner(_) => {
                ExitCodes::REMOTE_FAILURE
            }
            _ => ExitCodes::GENERAL_ERROR,
        };
    }
    if e.downcast_ref::<RunnerError>().is_some() {
        return ExitCodes::REMOTE_FAILURE;
    }

    let msg = e.to_string().to_lowercase();
    if msg.contains("remote") || msg.contains("ssh") {
        ExitCodes::REMOTE_FAILURE
    } else if msg.contains("config") {
        ExitCodes::CONFIG_ERROR
    } else if msg.contains("argument") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
