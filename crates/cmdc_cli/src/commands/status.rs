//! Status command - snapshot the remote host.

use std::path::Path;

use anyhow::{bail, Result};
use clap::Args;

use cmdc_pipeline::Orchestrator;
use cmdc_runner::ProbeOutput;

use super::{load_config, print_json};

#[derive(Args)]
pub struct StatusArgs {
    /// Print the snapshot as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: StatusArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let orchestrator = Orchestrator::from_config(&config)?;

    println!("📡 Checking {}...", config.ssh.address());
    let snapshot = orchestrator.refresh_status().await;

    if let Some(error) = &snapshot.error {
        bail!("remote host unreachable: {}", error);
    }

    if args.json {
        return print_json(&snapshot);
    }

    for (command, output) in &snapshot.system {
        match output {
            ProbeOutput::Output(text) => {
                println!("\n$ {}", command);
                println!("{}", text);
            }
            ProbeOutput::Error { error } => {
                println!("\n$ {}", command);
                println!("   ⚠️  {}", error);
            }
        }
    }
    println!("\n✅ Snapshot taken at {}", snapshot.timestamp.to_rfc3339());
    Ok(())
}
