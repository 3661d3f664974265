//! Conversation context handed to the translator.

use std::collections::VecDeque;

use cmdc_runner::SystemSnapshot;
use cmdc_translate::TranslationContext;

/// Recent accepted inputs and the last status snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    history: VecDeque<String>,
    limit: usize,
    snapshot: Option<SystemSnapshot>,
}

impl ConversationContext {
    pub fn new(limit: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(limit),
            limit,
            snapshot: None,
        }
    }

    /// Remember an accepted input, evicting the oldest beyond the limit.
    pub fn record(&mut self, input: &str) {
        if self.limit == 0 {
            return;
        }
        while self.history.len() >= self.limit {
            self.history.pop_front();
        }
        self.history.push_back(input.trim().to_string());
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.iter().cloned().collect()
    }

    pub fn set_snapshot(&mut self, snapshot: SystemSnapshot) {
        self.snapshot = Some(snapshot);
    }

    pub fn snapshot(&self) -> Option<&SystemSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn translation_context(&self) -> TranslationContext {
        let context = TranslationContext::new().with_history(self.history());
        match &self.snapshot {
            Some(snapshot) => context.with_system_state(snapshot.to_value()),
            None => context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdc_runner::ProbeOutput;

    fn snapshot(uptime: &str) -> SystemSnapshot {
        let json = serde_json::json!({
            "timestamp": "2024-05-01T10:00:00Z",
            "system": { "uptime": uptime },
        });
        let mut snapshot: SystemSnapshot = serde_json::from_value(json).unwrap();
        snapshot.system.insert(
            "free -h".to_string(),
            ProbeOutput::Error {
                error: "timed out".to_string(),
            },
        );
        snapshot
    }

    #[test]
    fn test_history_is_bounded() {
        let mut context = ConversationContext::new(2);
        context.record("memory");
        context.record(" disk space ");
        context.record("uptime");
        assert_eq!(context.history(), vec!["disk space", "uptime"]);
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let mut context = ConversationContext::new(0);
        context.record("memory");
        assert!(context.history().is_empty());
    }

    #[test]
    fn test_translation_context_carries_snapshot() {
        let mut context = ConversationContext::new(5);
        context.record("memory");
        assert!(context.translation_context().system_state.is_none());

        context.set_snapshot(snapshot("up 3 days"));
        let translation = context.translation_context();
        assert_eq!(translation.history, vec!["memory"]);
        let state = translation.system_state.unwrap();
        assert_eq!(state["system"]["uptime"], "up 3 days");
        assert_eq!(state["system"]["free -h"]["error"], "timed out");
    }
}
