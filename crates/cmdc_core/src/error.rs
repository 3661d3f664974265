//! Error types for the core module.

use thiserror::Error;

use crate::invocation::InvocationState;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur on the shared model.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid invocation transition: {from} -> {to}")]
    InvalidTransition {
        from: InvocationState,
        to: InvocationState,
    },

    #[error("Empty command plan")]
    EmptyPlan,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
