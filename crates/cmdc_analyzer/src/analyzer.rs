//! Analyzer front end.

use std::sync::Arc;

use tracing::{debug, info, warn};

use cmdc_core::{AnalysisResult, AnalysisSource};
use cmdc_llm::{
    parse_analysis, render_template, AnalysisReply, CompletionRequest, LlmResult,
    ReasoningService, RetryPolicy, ANALYSIS_TEMPLATE,
};

use crate::rules::analyze_output;

/// Output beyond this many characters is cut from the front before it is
/// sent to the reasoning service.
pub const DEFAULT_MAX_OUTPUT_CHARS: usize = 8000;

/// What to analyse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    /// The user's original wording
    pub input: String,
    /// The command that ran
    pub command: String,
    /// Captured stdout and stderr
    pub output: String,
}

impl AnalysisRequest {
    pub fn new(
        input: impl Into<String>,
        command: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            command: command.into(),
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    pub retry: RetryPolicy,
    pub max_output_chars: usize,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_output_chars: DEFAULT_MAX_OUTPUT_CHARS,
        }
    }
}

/// Turns finished command output into an [`AnalysisResult`].
#[derive(Clone, Default)]
pub struct Analyzer {
    service: Option<Arc<dyn ReasoningService>>,
    options: AnalyzerOptions,
}

impl Analyzer {
    /// Rule-based analyzer without a reasoning service.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: Arc<dyn ReasoningService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn has_service(&self) -> bool {
        self.service.is_some()
    }

    /// Analyse a finished command. Never fails: service errors fall back to
    /// the rule set.
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        let rules = analyze_output(&request.output);

        let Some(service) = self.service.as_ref() else {
            debug!("no reasoning service configured, using rules");
            return rules;
        };

        match self.ask_service(service.as_ref(), request).await {
            Ok(reply) => {
                info!(
                    service = service.name(),
                    confidence = reply.confidence,
                    "service analysis received"
                );
                merge(reply, rules)
            }
            Err(e) => {
                warn!(error = %e, "service analysis failed, using rules");
                rules
            }
        }
    }

    async fn ask_service(
        &self,
        service: &dyn ReasoningService,
        request: &AnalysisRequest,
    ) -> LlmResult<AnalysisReply> {
        let output = tail(&request.output, self.options.max_output_chars);
        let prompt = render_template(
            ANALYSIS_TEMPLATE,
            &[
                ("input", request.input.trim()),
                ("command", request.command.as_str()),
                ("output", output),
            ],
        );
        let completion = &CompletionRequest::new(prompt);

        self.options
            .retry
            .run(|| async move {
                let raw = service.complete(completion).await?;
                parse_analysis(&raw)
            })
            .await
    }
}

/// Service answer enriched with the rule findings.
fn merge(reply: AnalysisReply, rules: AnalysisResult) -> AnalysisResult {
    let AnalysisReply {
        analysis,
        confidence,
    } = reply;

    AnalysisResult {
        summary: analysis.summary,
        concerns: analysis.concerns,
        warnings: rules.warnings,
        recommendations: analysis.recommendations,
        details: analysis.details,
        confidence: confidence.clamp(0.0, 1.0),
        source: AnalysisSource::ExternalService,
        facts: rules.facts,
    }
}

/// Last `max_chars` characters of `text`, on a char boundary.
fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}
