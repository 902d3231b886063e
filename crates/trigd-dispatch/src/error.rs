//! Dispatch error types.

use thiserror::Error;
use trigd_core::{CoreError, PipelineId};
use trigd_ingest::IngestError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Busy check failed: {0}")]
    BusyCheck(String),

    #[error("Busy check timed out after {0}ms")]
    BusyCheckTimeout(u64),

    #[error("Enqueue failed for pipeline {pipeline_id}: {reason}")]
    Enqueue {
        pipeline_id: PipelineId,
        reason: String,
    },

    #[error("Enqueue timed out for pipeline {pipeline_id} after {timeout_ms}ms")]
    EnqueueTimeout {
        pipeline_id: PipelineId,
        timeout_ms: u64,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

impl DispatchError {
    /// Metric label for the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::BusyCheck(_) | Self::BusyCheckTimeout(_) => "busy_check",
            Self::Enqueue { .. } | Self::EnqueueTimeout { .. } => "enqueue",
            Self::Core(_) => "state",
            Self::Ingest(_) => "stream",
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
