//! Idempotency gate.
//!
//! One bulk busy-check per batch: which of these pipelines already have a
//! non-terminal execution? Candidates for busy pipelines are dropped. Any
//! failure of the check fails the batch; a pipeline is never assumed idle.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use trigd_core::{BoxFuture, CandidatePair, PipelineId};
use trigd_telemetry::Metrics;

use crate::error::{DispatchError, DispatchResult};

/// Execution-state store queried by the gate.
pub trait ExecutionStateStore: Send + Sync {
    /// The subset of `pipeline_ids` with a non-terminal execution.
    ///
    /// Must be answered by a single bulk query.
    fn busy_pipelines<'a>(
        &'a self,
        pipeline_ids: &'a [PipelineId],
    ) -> BoxFuture<'a, DispatchResult<HashSet<PipelineId>>>;
}

/// Gate output.
#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    /// Candidates whose pipeline is idle.
    pub passed: Vec<CandidatePair>,
    /// Candidates dropped because their pipeline is running.
    pub skipped: usize,
    pub busy: HashSet<PipelineId>,
}

/// Drops candidates for pipelines that are already running.
pub struct IdempotencyGate {
    store: Arc<dyn ExecutionStateStore>,
    timeout: Duration,
}

impl IdempotencyGate {
    pub fn new(store: Arc<dyn ExecutionStateStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Filter a batch's candidates with one busy-check query.
    ///
    /// No query is issued for an empty candidate set.
    pub async fn filter(&self, candidates: Vec<CandidatePair>) -> DispatchResult<GateOutcome> {
        if candidates.is_empty() {
            return Ok(GateOutcome::default());
        }

        let ids: Vec<PipelineId> = candidates
            .iter()
            .map(|c| c.pipeline_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let busy = tokio::time::timeout(self.timeout, self.store.busy_pipelines(&ids))
            .await
            .map_err(|_| DispatchError::BusyCheckTimeout(self.timeout.as_millis() as u64))??;

        let total = candidates.len();
        let passed: Vec<CandidatePair> = candidates
            .into_iter()
            .filter(|c| !busy.contains(&c.pipeline_id))
            .collect();
        let skipped = total - passed.len();

        if skipped > 0 {
            Metrics::skipped_running(skipped);
        }
        debug!(
            pipelines = ids.len(),
            busy = busy.len(),
            passed = passed.len(),
            skipped,
            "Busy check complete"
        );

        Ok(GateOutcome {
            passed,
            skipped,
            busy,
        })
    }
}
