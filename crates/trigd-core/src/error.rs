//! Error types for trigd-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Invalid batch transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
