//! Error types for the reasoning service client.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for reasoning service calls.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors talking to the reasoning service.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Reasoning service not configured. Set DEEPSEEK_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY")]
    NotConfigured,

    #[error("Network error: {0}")]
    Transport(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Empty response from reasoning service")]
    EmptyResponse,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("timeout: {}", err))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
