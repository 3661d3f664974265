//! Analyze command - interpret captured command output.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use cmdc_analyzer::{AnalysisRequest, Analyzer};
use cmdc_pipeline::render_analysis;

use super::{load_config, print_json};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// The request that produced the output
    #[arg(long, default_value = "")]
    input: String,

    /// The command that produced the output
    #[arg(long)]
    command: String,

    /// Read output from this file instead of stdin
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Use only the built-in rules
    #[arg(long)]
    offline: bool,

    /// Print the analysis as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: AnalyzeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    let output = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read output file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let mut analyzer = Analyzer::new().with_options(config.analyzer_options());
    if !args.offline && config.analyzer.use_service {
        if let Some(service) = config.reasoning_service() {
            analyzer = analyzer.with_service(service);
        }
    }

    let request = AnalysisRequest::new(args.input, args.command, output);
    let result = analyzer.analyze(&request).await;

    if args.json {
        print_json(&result)
    } else {
        print!("{}", render_analysis(&result));
        if !result.details.is_empty() {
            println!("\n{}", result.details);
        }
        Ok(())
    }
}
