//! Request translation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use cmdc_core::{shell_quote, CommandPlan, CommandStep};
use cmdc_llm::{
    parse_translation, render_template, CompletionRequest, LlmError, ReasoningService,
    TranslationReply, TRANSLATION_TEMPLATE,
};

use crate::table::{normalize, PhraseRule, PhraseTable};

/// Words that split a request into independently resolved parts.
const CONJUNCTIONS: &[&str] = &["and", "then", "plus", "&"];

/// Binaries whose invocations are executed as typed.
const PASSTHROUGH_BINARIES: &[&str] = &[
    "docker",
    "ls",
    "pwd",
    "df",
    "free",
    "ip",
    "ss",
    "smartctl",
    "lsblk",
    "systemctl",
];

const LOW_CONFIDENCE_WARNING: &str = "Low confidence in command translation";

/// How a translation was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranslationSource {
    ExactMatch,
    Passthrough,
    PartialMatch,
    CompoundMatch,
    ExternalService,
    Fallback,
}

impl std::fmt::Display for TranslationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ExactMatch => "exact",
            Self::Passthrough => "passthrough",
            Self::PartialMatch => "partial",
            Self::CompoundMatch => "compound",
            Self::ExternalService => "service",
            Self::Fallback => "fallback",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of translating one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    /// Rendered command line
    pub command: String,
    pub plan: CommandPlan,
    pub confidence: f64,
    pub source: TranslationSource,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub requires_confirmation: bool,
    /// Whether the reasoning service was asked
    #[serde(default)]
    pub consulted_service: bool,
}

impl TranslationResult {
    fn new(plan: CommandPlan, confidence: f64, source: TranslationSource) -> Self {
        Self {
            command: plan.render(),
            plan,
            confidence,
            source,
            warnings: Vec::new(),
            explanation: None,
            requires_confirmation: false,
            consulted_service: false,
        }
    }

    fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn is_fallback(&self) -> bool {
        self.source == TranslationSource::Fallback
    }
}

/// Context passed to the reasoning service.
#[derive(Debug, Clone, Default)]
pub struct TranslationContext {
    /// Previous requests, oldest first
    pub history: Vec<String>,
    /// Latest known system state
    pub system_state: Option<serde_json::Value>,
}

impl TranslationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }

    pub fn with_system_state(mut self, state: serde_json::Value) -> Self {
        self.system_state = Some(state);
        self
    }
}

/// Translator tuning.
#[derive(Debug, Clone)]
pub struct TranslatorOptions {
    /// Caller-side bound on a reasoning service call
    pub service_timeout: Duration,
    /// Minimum confidence for accepting a service translation
    pub min_service_confidence: f64,
    /// Whether well-known binaries are executed as typed
    pub passthrough: bool,
}

impl Default for TranslatorOptions {
    fn default() -> Self {
        Self {
            service_timeout: Duration::from_secs(15),
            min_service_confidence: 0.8,
            passthrough: true,
        }
    }
}

/// Translates free-form requests into command plans.
#[derive(Clone)]
pub struct Translator {
    table: PhraseTable,
    service: Option<Arc<dyn ReasoningService>>,
    options: TranslatorOptions,
}

impl Translator {
    /// Create a translator over `table` without a reasoning service.
    pub fn new(table: PhraseTable) -> Self {
        Self {
            table,
            service: None,
            options: TranslatorOptions::default(),
        }
    }

    /// Consult `service` when the phrase table has no answer.
    pub fn with_service(mut self, service: Arc<dyn ReasoningService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Set translation options.
    pub fn with_options(mut self, options: TranslatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Get the phrase table.
    pub fn table(&self) -> &PhraseTable {
        &self.table
    }

    /// Check whether a reasoning service is attached.
    pub fn has_service(&self) -> bool {
        self.service.is_some()
    }

    /// Translate `input`. Always returns a runnable plan.
    pub async fn translate(&self, input: &str, context: &TranslationContext) -> TranslationResult {
        if let Some(result) = self.translate_local(input) {
            return result;
        }

        let mut warnings = Vec::new();
        if let Some(service) = &self.service {
            match self.ask_service(service.as_ref(), input, context).await {
                Ok(Some(result)) => return result,
                Ok(None) => warnings.push(LOW_CONFIDENCE_WARNING.to_string()),
                Err(e) => {
                    warn!(error = %e, "reasoning service translation failed");
                    warnings.push(format!("Translation service unavailable: {}", e));
                }
            }
        }

        let mut result = self.fallback(input).with_warnings(warnings);
        result.consulted_service = self.service.is_some();
        result
    }

    /// Resolve `input` against the phrase table only.
    ///
    /// Returns `None` when nothing matched; [`Translator::translate`] then
    /// consults the service or falls back.
    pub fn translate_local(&self, input: &str) -> Option<TranslationResult> {
        let normalized = normalize(input);
        if normalized.is_empty() {
            return None;
        }

        if let Some(rule) = self.table.get(&normalized) {
            debug!(phrase = %rule.phrase, "exact match");
            return Some(TranslationResult::new(
                rule.plan.clone(),
                1.0,
                TranslationSource::ExactMatch,
            ));
        }

        let tokens = tokenize(&normalized);
        let has_conjunction = tokens.iter().any(|t| is_conjunction(t));

        if self.options.passthrough && !has_conjunction {
            if let Some(first) = tokens.first() {
                if PASSTHROUGH_BINARIES.contains(&first.as_str()) {
                    debug!(binary = %first, "passthrough");
                    return Some(TranslationResult::new(
                        CommandPlan::single(input.trim()),
                        0.9,
                        TranslationSource::Passthrough,
                    ));
                }
            }
        }

        if has_conjunction {
            let parts = split_parts(&tokens);
            if parts.len() >= 2 {
                if let Some(result) = self.translate_compound(&parts) {
                    return Some(result);
                }
            }
        }

        let words: Vec<&str> = tokens
            .iter()
            .map(String::as_str)
            .filter(|w| !is_conjunction(w))
            .collect();
        self.partial(&words).map(|rule| {
            debug!(phrase = %rule.phrase, "partial match");
            TranslationResult::new(rule.plan.clone(), 0.6, TranslationSource::PartialMatch)
        })
    }

    fn translate_compound(&self, parts: &[String]) -> Option<TranslationResult> {
        if let Some(rule) = self.table.find_containing_all(parts) {
            debug!(phrase = %rule.phrase, "compound key match");
            return Some(TranslationResult::new(
                rule.plan.clone(),
                0.9,
                TranslationSource::CompoundMatch,
            ));
        }

        let mut plan = CommandPlan::default();
        let mut warnings = Vec::new();
        let mut any_partial = false;
        let mut resolved = 0usize;

        for part in parts {
            let rule = match self.table.get(part) {
                Some(rule) => rule,
                None => {
                    let words: Vec<&str> = part.split_whitespace().collect();
                    match self.partial(&words) {
                        Some(rule) => {
                            any_partial = true;
                            rule
                        }
                        None => {
                            warnings.push(format!("Could not resolve '{}'", part));
                            continue;
                        }
                    }
                }
            };
            plan.extend_labelled(part, rule.plan.clone());
            resolved += 1;
        }

        if resolved == 0 {
            debug!(parts = parts.len(), "no compound part resolved");
            return None;
        }

        let confidence = if any_partial { 0.6 } else { 0.8 };
        Some(
            TranslationResult::new(plan, confidence, TranslationSource::CompoundMatch)
                .with_warnings(warnings),
        )
    }

    fn partial(&self, words: &[&str]) -> Option<&PhraseRule> {
        let words: Vec<&str> = words
            .iter()
            .copied()
            .filter(|w| w.chars().count() >= 2)
            .collect();
        self.table.find_partial(&words)
    }

    /// Ask the reasoning service. `Ok(None)` means the answer was rejected.
    async fn ask_service(
        &self,
        service: &dyn ReasoningService,
        input: &str,
        context: &TranslationContext,
    ) -> Result<Option<TranslationResult>, LlmError> {
        let history = serde_json::to_string(&context.history).unwrap_or_else(|_| "[]".to_string());
        let state = context
            .system_state
            .as_ref()
            .map(|s| serde_json::to_string_pretty(s).unwrap_or_default())
            .unwrap_or_else(|| "{}".to_string());

        let prompt = render_template(
            TRANSLATION_TEMPLATE,
            &[
                ("input", input.trim()),
                ("history", history.as_str()),
                ("systemState", state.as_str()),
            ],
        );
        let request = CompletionRequest::new(prompt);

        let limit = self.options.service_timeout;
        let raw = tokio::time::timeout(limit, service.complete(&request))
            .await
            .map_err(|_| LlmError::Timeout(limit))??;
        let reply = parse_translation(&raw)?;

        if reply.confidence < self.options.min_service_confidence {
            info!(
                confidence = reply.confidence,
                "rejected low-confidence service translation"
            );
            return Ok(None);
        }

        Ok(Some(service_result(reply)))
    }

    /// Diagnostic plan that prints the unknown input and the known phrases.
    pub fn fallback(&self, input: &str) -> TranslationResult {
        let message = format!(
            "Unknown command: '{}'\n\nAvailable commands:\n{}\n\nType 'help' for more details",
            input.trim(),
            self.table.phrases().join(", ")
        );
        let plan = CommandPlan::single(format!("printf '%s\\n' {}", shell_quote(&message)));
        TranslationResult::new(plan, 0.0, TranslationSource::Fallback)
    }
}

fn service_result(reply: TranslationReply) -> TranslationResult {
    let TranslationReply {
        translation,
        confidence,
        warnings,
        ..
    } = reply;

    let steps: Vec<CommandStep> = translation
        .sub_commands
        .iter()
        .filter(|c| !c.trim().is_empty())
        .map(CommandStep::new)
        .collect();
    let plan = CommandPlan::new(steps)
        .unwrap_or_else(|_| CommandPlan::single(translation.command.clone()));

    let mut result = TranslationResult::new(plan, confidence, TranslationSource::ExternalService)
        .with_warnings(warnings);
    if translation.requires_confirmation {
        result
            .warnings
            .push("This command requires confirmation".to_string());
    }
    if !translation.explanation.is_empty() {
        result.explanation = Some(translation.explanation);
    }
    result.requires_confirmation = translation.requires_confirmation;
    result.consulted_service = true;
    result
}

fn is_conjunction(token: &str) -> bool {
    CONJUNCTIONS.contains(&token)
}

/// Split on whitespace, isolating `&` and `&&` as `&` tokens.
fn tokenize(normalized: &str) -> Vec<String> {
    normalized
        .replace("&&", " & ")
        .replace('&', " & ")
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn split_parts(tokens: &[String]) -> Vec<String> {
    tokens
        .split(|t| is_conjunction(t))
        .filter(|group| !group.is_empty())
        .map(|group| group.join(" "))
        .collect()
}
