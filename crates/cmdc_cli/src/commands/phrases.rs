//! Phrases command - list the phrase table.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use cmdc_translate::help_text;

use super::{load_config, print_json};

#[derive(Args)]
pub struct PhrasesArgs {
    /// Show the grouped help text instead of every phrase
    #[arg(long)]
    help_text: bool,

    /// Print phrase and command pairs as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: PhrasesArgs, config_path: Option<&Path>) -> Result<()> {
    if args.help_text {
        println!("{}", help_text());
        return Ok(());
    }

    let config = load_config(config_path)?;
    let table = config.phrase_table()?;

    if args.json {
        let pairs: Vec<(&str, String)> = table
            .rules()
            .iter()
            .map(|rule| (rule.phrase.as_str(), rule.plan.render()))
            .collect();
        return print_json(&pairs);
    }

    let width = table.rules().iter().map(|r| r.phrase.len()).max().unwrap_or(0);
    for rule in table.rules() {
        println!("{:width$}  {}", rule.phrase, rule.plan.render(), width = width);
    }
    println!("\n{} phrases", table.len());
    Ok(())
}
