//! Error types for the runner module.

use std::time::Duration;

use thiserror::Error;

use cmdc_core::{CoreError, InvocationId};

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur while running remote commands.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Another command is already running ({active})")]
    Busy { active: InvocationId },

    #[error("No running command to stop")]
    NoActiveSession,

    #[error("SSH connection error: {0}")]
    Connect(String),

    #[error("SSH authentication failed: {0}")]
    Auth(String),

    #[error("Remote stream error: {0}")]
    Stream(String),

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command interrupted")]
    Interrupted,

    #[error("Invalid SSH configuration: {0}")]
    Config(String),

    #[error("Cannot load private key: {0}")]
    Key(String),

    #[error("Session task failed: {0}")]
    TaskFailed(String),

    #[error("Invalid invocation: {0}")]
    Invocation(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Whether the error was caused by the remote side or the link to it.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Connect(_) | Self::Auth(_) | Self::Stream(_) | Self::Timeout(_)
        )
    }
}

impl From<russh::Error> for RunnerError {
    fn from(err: russh::Error) -> Self {
        Self::Stream(err.to_string())
    }
}
