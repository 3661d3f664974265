//! Error types for the pipeline.

use std::path::PathBuf;

use thiserror::Error;

use cmdc_core::InvocationId;
use cmdc_runner::RunnerError;
use cmdc_translate::TranslateError;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced to front-ends.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Command is required")]
    EmptyInput,

    #[error("Another command is already running ({active})")]
    Busy { active: InvocationId },

    #[error("No running command to stop")]
    NothingRunning,

    #[error(transparent)]
    Runner(RunnerError),

    #[error("Cannot read config file {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    PhraseTable(#[from] TranslateError),
}

impl PipelineError {
    /// Status code a front-end should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::EmptyInput | Self::NothingRunning => 400,
            Self::Busy { .. } => 409,
            _ => 500,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::ConfigFile { .. } | Self::ConfigParse(_) | Self::Config(_) | Self::PhraseTable(_)
        )
    }
}

impl From<RunnerError> for PipelineError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Busy { active } => Self::Busy { active },
            RunnerError::NoActiveSession => Self::NothingRunning,
            other => Self::Runner(other),
        }
    }
}
