//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(#[from] trigd_cache::CacheError),

    #[error("Store error: {0}")]
    Store(#[from] trigd_store::StoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] trigd_telemetry::TelemetryError),

    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type AppResult<T> = Result<T, AppError>;
