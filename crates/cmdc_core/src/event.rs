//! Lifecycle events published to observers.
//!
//! Every event carries the invocation id so subscribers can discard events
//! for invocations they are not tracking. The serialized form uses the
//! consumer-facing event names (`commandIssued`, `commandOutput`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::invocation::{InvocationId, OutputChunk, OutputStream};

/// Command accepted by the remote host and running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandIssued {
    pub invocation_id: InvocationId,
    /// Natural-language input as submitted
    pub command: String,
    /// Shell command line being executed
    pub system_command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Incremental remote output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    pub invocation_id: InvocationId,
    #[serde(rename = "type")]
    pub stream: OutputStream,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub seq: u64,
    pub at: DateTime<Utc>,
}

impl CommandOutput {
    pub fn from_chunk(invocation_id: InvocationId, chunk: &OutputChunk) -> Self {
        Self::from_chunk_text(invocation_id, chunk, chunk.text())
    }

    /// Build the event for `chunk` with already decoded `data`.
    pub fn from_chunk_text(invocation_id: InvocationId, chunk: &OutputChunk, data: String) -> Self {
        Self {
            invocation_id,
            stream: chunk.stream,
            data,
            section: chunk.section.clone(),
            seq: chunk.seq,
            at: chunk.at,
        }
    }
}

/// Remote process exited, or the invocation failed terminally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFinished {
    pub invocation_id: InvocationId,
    pub code: Option<u32>,
    pub signal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandFinished {
    pub fn exited(invocation_id: InvocationId, code: Option<u32>, signal: Option<String>) -> Self {
        Self {
            invocation_id,
            code,
            signal,
            error: None,
        }
    }

    pub fn failed(invocation_id: InvocationId, error: impl Into<String>) -> Self {
        Self {
            invocation_id,
            code: None,
            signal: None,
            error: Some(error.into()),
        }
    }
}

/// Command interrupted on request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandStopped {
    pub invocation_id: InvocationId,
    pub message: String,
}

/// Post-execution analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAnalysis {
    pub invocation_id: InvocationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Event published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    #[serde(rename = "commandIssued")]
    Issued(CommandIssued),
    #[serde(rename = "commandOutput")]
    OutputChunk(CommandOutput),
    #[serde(rename = "commandFinished")]
    Finished(CommandFinished),
    #[serde(rename = "commandStopped")]
    Stopped(CommandStopped),
    #[serde(rename = "commandAnalysis")]
    Analysis(CommandAnalysis),
}

/// Discriminant of a [`LifecycleEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Issued,
    OutputChunk,
    Finished,
    Stopped,
    Analysis,
}

impl LifecycleEvent {
    pub fn invocation_id(&self) -> &InvocationId {
        match self {
            Self::Issued(e) => &e.invocation_id,
            Self::OutputChunk(e) => &e.invocation_id,
            Self::Finished(e) => &e.invocation_id,
            Self::Stopped(e) => &e.invocation_id,
            Self::Analysis(e) => &e.invocation_id,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Issued(_) => EventKind::Issued,
            Self::OutputChunk(_) => EventKind::OutputChunk,
            Self::Finished(_) => EventKind::Finished,
            Self::Stopped(_) => EventKind::Stopped,
            Self::Analysis(_) => EventKind::Analysis,
        }
    }

    /// Consumer-facing event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Issued(_) => "commandIssued",
            Self::OutputChunk(_) => "commandOutput",
            Self::Finished(_) => "commandFinished",
            Self::Stopped(_) => "commandStopped",
            Self::Analysis(_) => "commandAnalysis",
        }
    }

    /// Whether this event ends the execution phase of an invocation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_) | Self::Stopped(_))
    }
}
