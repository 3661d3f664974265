//! Error types for the translation module.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for phrase table operations.
pub type TranslateResult<T> = Result<T, TranslateError>;

/// Errors loading or validating a phrase table.
///
/// Translation itself never fails; these only surface while loading
/// configuration.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Cannot read phrase file {path}: {source}")]
    PhraseFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid phrase file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid phrase entry: {0}")]
    InvalidEntry(String),
}
