//! Ingestion error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Stream transport error: {0}")]
    Transport(String),

    #[error("Offset commit failed: {0}")]
    Commit(String),

    #[error("Stream rewind failed: {0}")]
    Rewind(String),
}

pub type IngestResult<T> = Result<T, IngestError>;
