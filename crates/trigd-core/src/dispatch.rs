//! Match output, dispatch payload and batch lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::ids::{OwnerId, PipelineId};
use crate::signal::{Direction, SignalEvent};

// ============================================================================
// CandidatePair
// ============================================================================

/// A (pipeline, signal, ticker) match produced by the match engine.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    pub pipeline_id: PipelineId,
    pub owner_id: OwnerId,
    pub signal_id: String,
    pub signal_type: String,
    /// Normalized ticker the pipeline matched on.
    pub matched_ticker: String,
    pub direction: Direction,
    pub confidence: f64,
    /// Index of the originating event within its batch.
    pub event_index: usize,
}

// ============================================================================
// DispatchDecision
// ============================================================================

/// Run request handed to the task queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchDecision {
    /// Unique per enqueue attempt, for downstream correlation.
    pub dispatch_id: Uuid,
    pub pipeline_id: PipelineId,
    pub owner_id: OwnerId,
    pub signal_id: String,
    pub signal_type: String,
    pub source: String,
    pub matched_ticker: String,
    pub direction: Direction,
    pub confidence: f64,
    pub signal_timestamp: DateTime<Utc>,
    /// Originating signal metadata, forwarded untouched.
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub enqueued_at: DateTime<Utc>,
}

impl DispatchDecision {
    /// Build the queue payload for a surviving candidate.
    pub fn from_candidate(pair: &CandidatePair, signal: &SignalEvent) -> Self {
        Self {
            dispatch_id: Uuid::new_v4(),
            pipeline_id: pair.pipeline_id,
            owner_id: pair.owner_id,
            signal_id: pair.signal_id.clone(),
            signal_type: pair.signal_type.clone(),
            source: signal.source.clone(),
            matched_ticker: pair.matched_ticker.clone(),
            direction: pair.direction,
            confidence: pair.confidence,
            signal_timestamp: signal.timestamp,
            metadata: signal.metadata.clone(),
            enqueued_at: Utc::now(),
        }
    }
}

// ============================================================================
// Batch lifecycle
// ============================================================================

/// Why a batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// Buffer reached `batch_size`.
    Size,
    /// `batch_timeout` elapsed since the first buffered record.
    Timeout,
    /// Consumer is stopping.
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Timeout => "timeout",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-batch state machine.
///
/// `Accumulating -> Flushed -> Matched -> Filtered -> Dispatched -> Committed`,
/// with `Failed` reachable from `Matched`, `Filtered` or `Dispatched`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BatchState {
    #[default]
    Accumulating,
    Flushed,
    Matched,
    Filtered,
    Dispatched,
    Committed,
    Failed,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accumulating => "accumulating",
            Self::Flushed => "flushed",
            Self::Matched => "matched",
            Self::Filtered => "filtered",
            Self::Dispatched => "dispatched",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: BatchState) -> bool {
        use BatchState::*;
        matches!(
            (self, next),
            (Accumulating, Flushed)
                | (Flushed, Matched)
                | (Matched, Filtered)
                | (Filtered, Dispatched)
                | (Dispatched, Committed)
                | (Matched, Failed)
                | (Filtered, Failed)
                | (Dispatched, Failed)
        )
    }

    /// Checked transition.
    pub fn advance(&mut self, next: BatchState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
