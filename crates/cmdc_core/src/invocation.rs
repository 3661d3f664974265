//! Invocation lifecycle model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Opaque identifier correlating every event of one request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(String);

impl InvocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for InvocationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for InvocationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Invocation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationState {
    /// Input accepted, nothing done yet
    Received,
    /// Natural-language input is being translated
    Translating,
    /// Command is executing on the remote host
    Running,
    /// Remote process exited (any exit code)
    Completed,
    /// Connection, stream or timeout failure
    Failed,
    /// Stopped by an interrupt request
    Interrupted,
}

impl InvocationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Interrupted)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Received => 0,
            Self::Translating => 1,
            Self::Running => 2,
            Self::Completed | Self::Failed | Self::Interrupted => 3,
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: InvocationState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed | Self::Interrupted => true,
            Self::Completed => *self == Self::Running,
            _ => next.rank() > self.rank(),
        }
    }
}

impl Default for InvocationState {
    fn default() -> Self {
        Self::Received
    }
}

impl std::fmt::Display for InvocationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::Translating => "translating",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        };
        write!(f, "{}", name)
    }
}

/// Remote output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One piece of output as it arrived from the remote process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    /// Per-invocation arrival sequence number
    pub seq: u64,
    pub stream: OutputStream,
    /// Raw bytes, untouched
    pub data: Vec<u8>,
    /// Label of the plan step that produced the chunk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub at: DateTime<Utc>,
}

impl OutputChunk {
    /// Lossy UTF-8 view of the chunk.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// One request lifecycle.
///
/// Owned by the session manager while the command runs; observers only see
/// the events derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    pub id: InvocationId,
    pub raw_input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_command: Option<String>,
    pub state: InvocationState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub output: Vec<OutputChunk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Invocation {
    pub fn new(id: InvocationId, raw_input: impl Into<String>) -> Self {
        Self {
            id,
            raw_input: raw_input.into(),
            source_tag: None,
            resolved_command: None,
            state: InvocationState::Received,
            created_at: Utc::now(),
            output: Vec::new(),
            exit_code: None,
            signal: None,
            error: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_tag = Some(source.into());
        self
    }

    /// Move to `next`, rejecting backwards or post-terminal transitions.
    pub fn transition(&mut self, next: InvocationState) -> CoreResult<()> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Record a terminal failure.
    pub fn fail(&mut self, error: impl Into<String>) -> CoreResult<()> {
        self.error = Some(error.into());
        self.transition(InvocationState::Failed)
    }

    /// Append an output chunk and return it.
    pub fn push_output(
        &mut self,
        stream: OutputStream,
        data: Vec<u8>,
        section: Option<String>,
    ) -> &OutputChunk {
        let seq = self.output.len() as u64;
        self.output.push(OutputChunk {
            seq,
            stream,
            data,
            section,
            at: Utc::now(),
        });
        &self.output[self.output.len() - 1]
    }

    /// All captured bytes in arrival order.
    pub fn captured_bytes(&self) -> Vec<u8> {
        self.output.iter().flat_map(|c| c.data.iter().copied()).collect()
    }

    /// Captured bytes of one stream.
    pub fn stream_bytes(&self, stream: OutputStream) -> Vec<u8> {
        self.output
            .iter()
            .filter(|c| c.stream == stream)
            .flat_map(|c| c.data.iter().copied())
            .collect()
    }

    /// Combined output as text.
    pub fn captured_text(&self) -> String {
        String::from_utf8_lossy(&self.captured_bytes()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        let mut inv = Invocation::new("inv-1".into(), "memory");
        inv.transition(InvocationState::Translating).unwrap();
        inv.transition(InvocationState::Running).unwrap();
        inv.transition(InvocationState::Completed).unwrap();
        assert!(inv.state.is_terminal());
    }

    #[test]
    fn test_terminal_is_final() {
        let mut inv = Invocation::new("inv-1".into(), "memory");
        inv.transition(InvocationState::Interrupted).unwrap();

        let err = inv.transition(InvocationState::Running).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert!(inv.transition(InvocationState::Failed).is_err());
    }

    #[test]
    fn test_completed_requires_running() {
        let mut inv = Invocation::new("inv-1".into(), "memory");
        assert!(inv.transition(InvocationState::Completed).is_err());
        assert!(inv.fail("connection refused").is_ok());
        assert_eq!(inv.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_no_backwards_transition() {
        let mut inv = Invocation::new("inv-1".into(), "memory");
        inv.transition(InvocationState::Running).unwrap();
        assert!(inv.transition(InvocationState::Translating).is_err());
    }

    #[test]
    fn test_output_sequence_and_concatenation() {
        let mut inv = Invocation::new("inv-1".into(), "memory");
        inv.push_output(OutputStream::Stdout, b"total ".to_vec(), None);
        inv.push_output(OutputStream::Stderr, b"warn\n".to_vec(), None);
        let last = inv.push_output(OutputStream::Stdout, b"used\n".to_vec(), None);
        assert_eq!(last.seq, 2);

        assert_eq!(inv.captured_bytes(), b"total warn\nused\n".to_vec());
        assert_eq!(inv.stream_bytes(OutputStream::Stdout), b"total used\n".to_vec());
        assert_eq!(inv.stream_bytes(OutputStream::Stderr), b"warn\n".to_vec());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(InvocationId::generate(), InvocationId::generate());
    }
}
