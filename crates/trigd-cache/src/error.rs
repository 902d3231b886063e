//! Cache error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Pipeline source query failed: {0}")]
    Source(String),

    #[error("Pipeline source query timed out after {0}ms")]
    Timeout(u64),
}

pub type CacheResult<T> = Result<T, CacheError>;
