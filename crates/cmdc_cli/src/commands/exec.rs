//! Exec command - translate, run and analyse a request.

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Result};
use clap::Args;
use tracing::{info, warn};

use cmdc_core::{EventFilter, InvocationId, LifecycleEvent};
use cmdc_pipeline::{ConsoleRenderer, Orchestrator, SubmitRequest};

use super::load_config;

#[derive(Args)]
pub struct ExecArgs {
    /// Natural-language request, e.g. `disk space`
    #[arg(required = true, num_args = 1..)]
    words: Vec<String>,

    /// Invocation id to use instead of a generated one
    #[arg(long)]
    id: Option<String>,

    /// Source tag echoed in the issued event
    #[arg(long, default_value = "cli")]
    source: String,

    /// Skip the post-execution analysis
    #[arg(long)]
    no_analysis: bool,

    /// Print raw lifecycle events as JSON lines
    #[arg(long)]
    json: bool,
}

impl ExecArgs {
    pub fn input(&self) -> String {
        self.words.join(" ")
    }
}

pub async fn execute(args: ExecArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let mut orchestrator = Orchestrator::from_config(&config)?;
    if args.no_analysis {
        orchestrator = orchestrator.with_analyzer(None);
    }

    let id = args
        .id
        .clone()
        .map(InvocationId::new)
        .unwrap_or_else(InvocationId::generate);
    let mut events = orchestrator.subscribe(EventFilter::Invocation(id.clone()));

    let request = SubmitRequest::new(args.input())
        .with_id(id)
        .with_source(args.source.clone());
    let submission = orchestrator.submit(request).await?;

    if args.json {
        println!("{}", serde_json::to_string(&submission)?);
    } else {
        let translation = &submission.translation;
        eprintln!(
            "🔎 {} ({}, confidence {:.2})",
            args.input(),
            translation.source,
            translation.confidence
        );
        for warning in &translation.warnings {
            eprintln!("   ⚠️  {}", warning);
        }
    }

    let mut renderer = ConsoleRenderer::new();
    let mut outcome: Option<LifecycleEvent> = None;
    let mut cancelled = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };

                if args.json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    print!("{}", renderer.render(&event));
                    std::io::stdout().flush()?;
                }

                match &event {
                    LifecycleEvent::Finished(finished) => {
                        let analysis_follows = finished.error.is_none()
                            && orchestrator.analysis_enabled();
                        outcome = Some(event.clone());
                        if !analysis_follows {
                            break;
                        }
                    }
                    LifecycleEvent::Stopped(_) => {
                        outcome = Some(event.clone());
                        break;
                    }
                    LifecycleEvent::Analysis(_) => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancelled => {
                cancelled = true;
                match orchestrator.cancel() {
                    Ok(id) => info!(invocation = %id, "interrupt sent"),
                    Err(e) => warn!(error = %e, "nothing to interrupt"),
                }
            }
        }
    }

    if events.dropped() > 0 {
        warn!(dropped = events.dropped(), "output events were dropped");
    }

    match outcome {
        Some(LifecycleEvent::Finished(finished)) => {
            if let Some(error) = finished.error {
                bail!("remote command failed: {}", error);
            }
            match (finished.code, finished.signal) {
                (_, Some(signal)) => bail!("remote command terminated by signal {}", signal),
                (Some(code), None) if code != 0 => bail!("remote command exited with code {}", code),
                _ => Ok(()),
            }
        }
        _ => Ok(()),
    }
}
