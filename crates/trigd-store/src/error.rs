//! Adapter error types.

use thiserror::Error;
use trigd_core::PipelineId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Invalid subscription filters for pipeline {pipeline_id}: {reason}")]
    InvalidFilters {
        pipeline_id: PipelineId,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
