//! CLI command definitions.
//!
//! Each subcommand is one entry point into the cmdcenter pipeline.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};

use cmdc_pipeline::AppConfig;

pub mod analyze;
pub mod exec;
pub mod phrases;
pub mod status;
pub mod translate;

/// cmdc - run natural-language requests on a remote host
#[derive(Parser)]
#[command(name = "cmdc")]
#[command(version, about = "cmdc - run natural-language requests on a remote host")]
#[command(long_about = r#"
cmdc translates requests such as "disk space" or "memory and temperature"
into shell commands, runs them over SSH on the configured host, streams the
output and interprets the result.

COMMANDS:
  exec       → Translate, run and analyse a request
  translate  → Show how a request would be translated
  analyze    → Analyse captured command output
  status     → Snapshot load, memory, disks, temperature and addresses
  phrases    → List the known phrases

CONFIGURATION:
  --config FILE or CMDC_CONFIG, then SSH_HOST, SSH_PORT, SSH_USERNAME and
  SSH_PRIVATE_KEY. DEEPSEEK_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY
  enable the reasoning service.

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Remote or session failure
  4 - Configuration error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "CMDC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate, run and analyse a request
    Exec(exec::ExecArgs),

    /// Show the translation of a request without running it
    Translate(translate::TranslateArgs),

    /// Analyse command output from a file or stdin
    Analyze(analyze::AnalyzeArgs),

    /// Take a status snapshot of the remote host
    Status(status::StatusArgs),

    /// List the phrase table
    Phrases(phrases::PhrasesArgs),
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(AppConfig::load(path)?)
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
