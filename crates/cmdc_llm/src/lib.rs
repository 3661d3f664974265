//! # cmdc_llm
//!
//! Client for the external reasoning service consulted by the translator
//! (when no local phrase matches) and the analyzer (to interpret command
//! output).
//!
//! The service is used only through [`ReasoningService`], a narrow
//! prompt-in / text-out contract. [`LlmAdapter`] talks to OpenAI-compatible
//! endpoints (DeepSeek by default) and Anthropic. Replies are parsed
//! leniently by the [`reply`] module; callers decide how often to retry via
//! [`RetryPolicy`].

pub mod client;
pub mod error;
pub mod mock;
pub mod prompts;
pub mod reply;
pub mod retry;

pub use client::{CompletionRequest, LlmAdapter, LlmOptions, LlmProvider, ReasoningService};
pub use error::{LlmError, LlmResult};
pub use mock::ScriptedService;
pub use prompts::{render_template, ANALYSIS_TEMPLATE, SYSTEM_PROMPT, TRANSLATION_TEMPLATE};
pub use reply::{
    extract_json, parse_analysis, parse_translation, AnalysisBody, AnalysisReply,
    TranslatedCommand, TranslationReply,
};
pub use retry::RetryPolicy;
