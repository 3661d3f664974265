//! Ordered phrase table.
//!
//! Rules are kept in declaration order, and every lookup that can match
//! more than one rule returns the first one in that order.

use std::path::Path;

use serde::{Deserialize, Serialize};

use cmdc_core::{CommandPlan, CommandStep};

use crate::error::{TranslateError, TranslateResult};

/// One table entry as written in configuration: aliases sharing a command.
///
/// ```toml
/// [[entry]]
/// phrases = ["memory", "ram"]
/// command = "free -h"
///
/// [[entry]]
/// phrases = ["network"]
/// steps = [
///     { command = "ip -br addr" },
///     { label = "Routing", command = "ip -br route" },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseEntry {
    pub phrases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<CommandStep>,
}

impl PhraseEntry {
    pub fn command(phrases: &[&str], command: impl Into<String>) -> Self {
        Self {
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
            command: Some(command.into()),
            steps: Vec::new(),
        }
    }

    pub fn steps(phrases: &[&str], steps: Vec<CommandStep>) -> Self {
        Self {
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
            command: None,
            steps,
        }
    }

    fn plan(&self) -> TranslateResult<CommandPlan> {
        match (&self.command, self.steps.is_empty()) {
            (Some(command), true) if !command.trim().is_empty() => {
                Ok(CommandPlan::single(command.clone()))
            }
            (None, false) => CommandPlan::new(self.steps.clone())
                .map_err(|e| TranslateError::InvalidEntry(e.to_string())),
            _ => Err(TranslateError::InvalidEntry(format!(
                "{:?}: exactly one of `command` or `steps` is required",
                self.phrases
            ))),
        }
    }
}

/// A single phrase and the plan it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseRule {
    /// Normalized phrase (trimmed, lowercase)
    pub phrase: String,
    pub plan: CommandPlan,
}

#[derive(Debug, Deserialize)]
struct PhraseFile {
    #[serde(default)]
    entry: Vec<PhraseEntry>,
}

/// Ordered phrase → plan rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseTable {
    rules: Vec<PhraseRule>,
}

impl PhraseTable {
    /// Build a table from entries, flattening aliases in order.
    ///
    /// Later duplicates of a phrase are ignored.
    pub fn from_entries(entries: Vec<PhraseEntry>) -> TranslateResult<Self> {
        let mut rules: Vec<PhraseRule> = Vec::new();
        for entry in entries {
            if entry.phrases.is_empty() {
                return Err(TranslateError::InvalidEntry(
                    "entry without phrases".to_string(),
                ));
            }
            let plan = entry.plan()?;
            for phrase in &entry.phrases {
                let phrase = normalize(phrase);
                if phrase.is_empty() || rules.iter().any(|r| r.phrase == phrase) {
                    continue;
                }
                rules.push(PhraseRule {
                    phrase,
                    plan: plan.clone(),
                });
            }
        }
        Ok(Self { rules })
    }

    /// Parse a TOML phrase file.
    pub fn from_toml_str(content: &str) -> TranslateResult<Self> {
        let file: PhraseFile = toml::from_str(content)?;
        Self::from_entries(file.entry)
    }

    /// Load a TOML phrase file from disk.
    pub fn load(path: &Path) -> TranslateResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| TranslateError::PhraseFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn rules(&self) -> &[PhraseRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All phrases in declaration order.
    pub fn phrases(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.phrase.as_str()).collect()
    }

    /// Exact lookup of an already normalized phrase.
    pub fn get(&self, phrase: &str) -> Option<&PhraseRule> {
        self.rules.iter().find(|r| r.phrase == phrase)
    }

    /// First rule whose phrase contains every part.
    pub fn find_containing_all(&self, parts: &[String]) -> Option<&PhraseRule> {
        self.rules
            .iter()
            .find(|r| parts.iter().all(|part| r.phrase.contains(part.as_str())))
    }

    /// First rule whose phrase contains at least one of the words.
    pub fn find_partial(&self, words: &[&str]) -> Option<&PhraseRule> {
        if words.is_empty() {
            return None;
        }
        self.rules
            .iter()
            .find(|r| words.iter().any(|word| r.phrase.contains(word)))
    }
}

/// Trim and lowercase user input or a table phrase.
pub fn normalize(input: &str) -> String {
    input.trim().to_lowercase()
}
