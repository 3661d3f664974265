//! Lenient parsing of reasoning service replies.
//!
//! Models often wrap JSON in Markdown fences or add prose around it. The
//! parser tries the raw text, then the fenced or brace-delimited body, and
//! finally one clean-up pass that replaces control characters before giving
//! up with [`LlmError::MalformedResponse`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{LlmError, LlmResult};

/// Translation answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationReply {
    pub translation: TranslatedCommand,
    pub confidence: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedCommand {
    pub command: String,
    #[serde(default)]
    pub sub_commands: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub requires_confirmation: bool,
}

/// Analysis answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReply {
    pub analysis: AnalysisBody,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBody {
    pub summary: String,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub details: String,
}

/// Parse a translation reply, requiring a non-empty command.
pub fn parse_translation(raw: &str) -> LlmResult<TranslationReply> {
    let reply: TranslationReply = parse_lenient(raw)?;
    if reply.translation.command.trim().is_empty() {
        return Err(LlmError::MalformedResponse(
            "missing translation.command".to_string(),
        ));
    }
    Ok(reply)
}

/// Parse an analysis reply.
pub fn parse_analysis(raw: &str) -> LlmResult<AnalysisReply> {
    parse_lenient(raw)
}

/// Extract the JSON document from a raw reply.
pub fn extract_json(raw: &str) -> LlmResult<serde_json::Value> {
    parse_lenient(raw)
}

fn parse_lenient<T: DeserializeOwned>(raw: &str) -> LlmResult<T> {
    let body = json_body(raw);
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(_) => {
            let cleaned = strip_control_chars(body);
            serde_json::from_str(&cleaned).map_err(|e| LlmError::MalformedResponse(e.to_string()))
        }
    }
}

/// Narrow a reply to its JSON body: fenced block first, then outermost braces.
fn json_body(raw: &str) -> &str {
    let trimmed = raw.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        // Skip the info string (`json`, `JSON`, ...)
        let content_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let content = &after_fence[content_start..];
        if let Some(end) = content.find("```") {
            return content[..end].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn strip_control_chars(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSLATION: &str = r#"{
        "translation": {
            "command": "df -h",
            "subCommands": [],
            "explanation": "Shows disk usage",
            "requiresConfirmation": false
        },
        "confidence": 0.92,
        "warnings": []
    }"#;

    #[test]
    fn test_plain_json() {
        let reply = parse_translation(TRANSLATION).unwrap();
        assert_eq!(reply.translation.command, "df -h");
        assert!((reply.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fenced_json() {
        let raw = format!("Here you go:\n```json\n{}\n```\nAnything else?", TRANSLATION);
        let reply = parse_translation(&raw).unwrap();
        assert_eq!(reply.translation.explanation, "Shows disk usage");
    }

    #[test]
    fn test_prose_around_braces() {
        let raw = format!("Sure! {} Hope that helps.", TRANSLATION);
        assert!(parse_translation(&raw).is_ok());
    }

    #[test]
    fn test_control_characters_are_cleaned() {
        let raw = "{\"analysis\": {\"summary\": \"line one\nline two\", \"concerns\": []}, \"confidence\": 0.7}";
        let reply = parse_analysis(raw).unwrap();
        assert_eq!(reply.analysis.summary, "line one line two");
    }

    #[test]
    fn test_missing_command_is_malformed() {
        let raw = r#"{"translation": {"command": "  "}, "confidence": 0.9}"#;
        assert!(matches!(
            parse_translation(raw),
            Err(LlmError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse_analysis("the server looks fine"),
            Err(LlmError::MalformedResponse(_))
        ));
    }
}
