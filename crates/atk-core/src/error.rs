//! Error types for ATK.

use thiserror::Error;

/// Main error type for ATK operations.
#[derive(Error, Debug)]
pub enum AtkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Renderer error: {0}")]
    Renderer(String),

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Resource in use: {0}")]
    InUse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for ATK operations.
pub type Result<T> = std::result::Result<T, AtkError>;
