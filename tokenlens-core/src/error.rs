//! Error types for tokenlens-core

use thiserror::Error;

/// Main error type for the tokenlens-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An adapter claimed the payload but could not map it
    #[error("format error in {adapter} payload: {reason}")]
    Format { adapter: String, reason: String },

    /// No registered adapter recognized the payload
    #[error("no registered format matches the payload")]
    NoMatchingFormat,

    /// Canonical-model invariant violation
    #[error("validation error at {path}: {constraint}")]
    Validation { path: String, constraint: String },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Generative-text service failure (unreachable, or reply unusable)
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// Tokenizer construction error
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

/// Result type alias for tokenlens-core
pub type Result<T> = std::result::Result<T, Error>;
