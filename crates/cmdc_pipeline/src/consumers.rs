//! Event consumers.
//!
//! Both consumers are plain state machines fed with [`LifecycleEvent`]s;
//! the caller owns the subscription and decides where the text goes.

use std::collections::{HashMap, VecDeque};

use cmdc_core::{AnalysisResult, InvocationId, LifecycleEvent};

/// Lines shown in one chat message.
pub const TRANSCRIPT_LINES: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptStatus {
    Processing,
    Completed,
    Failed,
    Stopped,
}

impl TranscriptStatus {
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Processing => "🔄",
            Self::Completed => "✅",
            Self::Failed | Self::Stopped => "⚠️",
        }
    }
}

#[derive(Debug, Clone)]
struct Transcript {
    /// Only the lines that fit in one message are kept
    lines: VecDeque<String>,
    status: TranscriptStatus,
}

impl Transcript {
    fn push(&mut self, line: String, max_lines: usize) {
        if self.lines.len() == max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn render(&self) -> String {
        let lines: Vec<&str> = self.lines.iter().map(String::as_str).collect();
        format!(
            "{} Command Output:\n```\n{}\n```",
            self.status.marker(),
            lines.join("\n")
        )
    }
}

/// Editable chat message per tracked invocation.
///
/// Only invocations registered with [`ChatTranscript::track`] are followed;
/// each is forgotten after its terminal event. A caller whose subscription
/// lagged may have missed that event and should [`ChatTranscript::forget`]
/// the invocation itself.
#[derive(Debug, Clone)]
pub struct ChatTranscript {
    tracked: HashMap<InvocationId, Transcript>,
    max_lines: usize,
}

impl Default for ChatTranscript {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatTranscript {
    /// Create a transcript showing the last [`TRANSCRIPT_LINES`] lines.
    pub fn new() -> Self {
        Self {
            tracked: HashMap::new(),
            max_lines: TRANSCRIPT_LINES,
        }
    }

    /// Set the number of lines kept per message.
    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines.max(1);
        self
    }

    /// Start following `id`.
    pub fn track(&mut self, id: InvocationId) {
        self.tracked.insert(
            id,
            Transcript {
                lines: VecDeque::with_capacity(self.max_lines),
                status: TranscriptStatus::Processing,
            },
        );
    }

    /// Stop following `id`. Returns whether it was tracked.
    pub fn forget(&mut self, id: &InvocationId) -> bool {
        self.tracked.remove(id).is_some()
    }

    pub fn is_tracking(&self, id: &InvocationId) -> bool {
        self.tracked.contains_key(id)
    }

    /// Number of invocations currently followed.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    pub fn render(&self, id: &InvocationId) -> Option<String> {
        self.tracked.get(id).map(Transcript::render)
    }

    /// Apply an event and return the updated message, if it changed.
    pub fn apply(&mut self, event: &LifecycleEvent) -> Option<String> {
        let id = event.invocation_id();
        let max = self.max_lines;
        let transcript = self.tracked.get_mut(id)?;

        match event {
            LifecycleEvent::Issued(issued) => {
                transcript.push(format!("Executing: {}", issued.system_command), max);
            }
            LifecycleEvent::OutputChunk(output) => {
                for line in output.data.lines() {
                    transcript.push(line.to_string(), max);
                }
            }
            LifecycleEvent::Finished(finished) => match &finished.error {
                Some(error) => {
                    transcript.status = TranscriptStatus::Failed;
                    transcript.push(format!("Command failed: {}", error), max);
                }
                None => {
                    transcript.status = TranscriptStatus::Completed;
                    transcript.push("Command completed.".to_string(), max);
                }
            },
            LifecycleEvent::Stopped(_) => {
                transcript.status = TranscriptStatus::Stopped;
                transcript.push("Command stopped.".to_string(), max);
            }
            LifecycleEvent::Analysis(_) => return None,
        }

        let rendered = transcript.render();
        if event.is_terminal() {
            self.tracked.remove(id);
        }
        Some(rendered)
    }
}

/// Formats events for a terminal.
#[derive(Debug, Clone, Default)]
pub struct ConsoleRenderer {
    section: Option<String>,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to print for `event`. Output chunks are returned verbatim, so
    /// the caller must not add newlines.
    pub fn render(&mut self, event: &LifecycleEvent) -> String {
        match event {
            LifecycleEvent::Issued(issued) => {
                self.section = None;
                format!("$ {}\n", issued.system_command)
            }
            LifecycleEvent::OutputChunk(output) => {
                let mut text = String::new();
                if output.section.is_some() && output.section != self.section {
                    self.section = output.section.clone();
                    if let Some(label) = &output.section {
                        text.push_str(&format!("\n=== {} ===\n", label));
                    }
                }
                text.push_str(&output.data);
                text
            }
            LifecycleEvent::Finished(finished) => {
                match (&finished.error, &finished.signal, finished.code) {
                    (Some(error), _, _) => format!("[error] {}\n", error),
                    (None, Some(signal), _) => format!("[terminated by signal {}]\n", signal),
                    (None, None, Some(code)) => format!("[exit {}]\n", code),
                    (None, None, None) => "[finished]\n".to_string(),
                }
            }
            LifecycleEvent::Stopped(stopped) => format!("[stopped] {}\n", stopped.message),
            LifecycleEvent::Analysis(analysis) => match (&analysis.analysis, &analysis.error) {
                (Some(result), _) => render_analysis(result),
                (None, Some(error)) => format!("Analysis failed: {}\n", error),
                (None, None) => String::new(),
            },
        }
    }
}

/// Multi-line summary of an analysis.
pub fn render_analysis(result: &AnalysisResult) -> String {
    let mut text = format!(
        "\nAnalysis ({:.0}% confidence): {}\n",
        result.confidence * 100.0,
        result.summary
    );
    for concern in &result.concerns {
        text.push_str(&format!("  ! {}\n", concern));
    }
    for warning in &result.warnings {
        text.push_str(&format!("  ~ {}\n", warning));
    }
    for recommendation in &result.recommendations {
        text.push_str(&format!("  > {}\n", recommendation));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cmdc_core::{
        CommandFinished, CommandIssued, CommandOutput, CommandStopped, OutputStream,
    };

    fn issued(id: &str) -> LifecycleEvent {
        LifecycleEvent::Issued(CommandIssued {
            invocation_id: id.into(),
            command: "memory".to_string(),
            system_command: "free -h".to_string(),
            source: Some("chat".to_string()),
        })
    }

    fn output(id: &str, seq: u64, data: &str, section: Option<&str>) -> LifecycleEvent {
        LifecycleEvent::OutputChunk(CommandOutput {
            invocation_id: id.into(),
            stream: OutputStream::Stdout,
            data: data.to_string(),
            section: section.map(str::to_string),
            seq,
            at: Utc::now(),
        })
    }

    #[test]
    fn test_transcript_lifecycle() {
        let mut chat = ChatTranscript::new();
        chat.track("msg-1".into());

        let first = chat.apply(&issued("msg-1")).unwrap();
        assert!(first.starts_with("🔄 Command Output:"));
        assert!(first.contains("Executing: free -h"));

        chat.apply(&output("msg-1", 0, "Mem: 3.7Gi\nSwap: 0B\n", None));
        let last = chat
            .apply(&LifecycleEvent::Finished(CommandFinished::exited(
                "msg-1".into(),
                Some(0),
                None,
            )))
            .unwrap();
        assert!(last.starts_with("✅"));
        assert!(last.contains("Swap: 0B\nCommand completed."));
        assert!(!chat.is_tracking(&"msg-1".into()));
    }

    #[test]
    fn test_transcript_ignores_untracked() {
        let mut chat = ChatTranscript::new();
        chat.track("msg-1".into());
        assert!(chat.apply(&issued("msg-2")).is_none());
    }

    #[test]
    fn test_transcript_keeps_last_lines() {
        let mut chat = ChatTranscript::new();
        chat.track("msg-1".into());
        let data: String = (0..30).map(|i| format!("line {}\n", i)).collect();
        let rendered = chat.apply(&output("msg-1", 0, &data, None)).unwrap();

        assert!(!rendered.contains("line 14\n"));
        assert!(rendered.contains("line 15\n"));
        assert!(rendered.contains("line 29\n```"));
    }

    #[test]
    fn test_transcript_storage_is_bounded() {
        let mut chat = ChatTranscript::new();
        let id: InvocationId = "msg-1".into();
        chat.track(id.clone());
        chat.apply(&issued("msg-1"));
        for seq in 0..200 {
            chat.apply(&output("msg-1", seq, &format!("row {}\nrow {}b\n", seq, seq), None));
        }

        assert_eq!(chat.tracked[&id].lines.len(), TRANSCRIPT_LINES);
        let rendered = chat.render(&id).unwrap();
        assert!(rendered.contains("row 199b\n```"));
        assert!(!rendered.contains("Executing:"));
    }

    #[test]
    fn test_forget_drops_missed_terminal() {
        let mut chat = ChatTranscript::new();
        chat.track("msg-1".into());
        chat.track("msg-2".into());
        chat.apply(&output("msg-1", 0, "partial\n", None));

        assert!(chat.forget(&"msg-1".into()));
        assert!(!chat.forget(&"msg-1".into()));
        assert_eq!(chat.tracked_count(), 1);
        assert!(chat.apply(&output("msg-1", 1, "late\n", None)).is_none());
    }

    #[test]
    fn test_transcript_stopped() {
        let mut chat = ChatTranscript::new();
        chat.track("msg-1".into());
        let rendered = chat
            .apply(&LifecycleEvent::Stopped(CommandStopped {
                invocation_id: "msg-1".into(),
                message: "interrupted".to_string(),
            }))
            .unwrap();
        assert!(rendered.starts_with("⚠️"));
        assert!(rendered.contains("Command stopped."));
    }

    #[test]
    fn test_console_section_headers() {
        let mut console = ConsoleRenderer::new();
        assert_eq!(console.render(&issued("inv")), "$ free -h\n");
        assert_eq!(console.render(&output("inv", 0, "a\n", None)), "a\n");
        assert_eq!(
            console.render(&output("inv", 1, "b\n", Some("Routing"))),
            "\n=== Routing ===\nb\n"
        );
        assert_eq!(console.render(&output("inv", 2, "c\n", Some("Routing"))), "c\n");
        assert_eq!(
            console.render(&LifecycleEvent::Finished(CommandFinished::exited(
                "inv".into(),
                Some(1),
                None
            ))),
            "[exit 1]\n"
        );
    }
}
