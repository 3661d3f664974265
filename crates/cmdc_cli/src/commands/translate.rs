//! Translate command - show how a request would be translated.

use std::path::Path;

use anyhow::Result;
use clap::Args;

use cmdc_translate::{TranslationContext, Translator};

use super::{load_config, print_json};

#[derive(Args)]
pub struct TranslateArgs {
    /// Natural-language request
    #[arg(required = true, num_args = 1..)]
    words: Vec<String>,

    /// Never consult the reasoning service
    #[arg(long)]
    offline: bool,
}

pub async fn execute(args: TranslateArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    let mut translator =
        Translator::new(config.phrase_table()?).with_options(config.translator_options());
    if !args.offline && config.translator.use_service {
        if let Some(service) = config.reasoning_service() {
            translator = translator.with_service(service);
        }
    }

    let input = args.words.join(" ");
    let result = translator.translate(&input, &TranslationContext::new()).await;
    print_json(&result)
}
