//! In-memory execution ledger.
//!
//! Plays both the task queue and the execution-state store: an enqueued run
//! marks its pipeline running until [`MemoryExecutionLedger::complete`]
//! moves it to a terminal state. Used by tests and local runs.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use trigd_core::{BoxFuture, DispatchDecision, PipelineId};

use crate::dispatcher::TaskQueue;
use crate::error::{DispatchError, DispatchResult};
use crate::gate::ExecutionStateStore;

#[derive(Debug, Default)]
struct LedgerState {
    running: HashSet<PipelineId>,
    enqueued: Vec<DispatchDecision>,
    enqueue_attempts: usize,
    /// Fail every enqueue once this many have succeeded.
    fail_enqueue_after: Option<usize>,
    fail_busy_checks: bool,
    busy_queries: Vec<Vec<PipelineId>>,
}

#[derive(Debug, Default)]
pub struct MemoryExecutionLedger {
    state: Mutex<LedgerState>,
}

impl MemoryExecutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record a non-terminal execution.
    pub fn mark_running(&self, pipeline_id: PipelineId) {
        self.state.lock().running.insert(pipeline_id);
    }

    /// Move a pipeline's execution to a terminal state.
    pub fn complete(&self, pipeline_id: PipelineId) {
        self.state.lock().running.remove(&pipeline_id);
    }

    pub fn is_running(&self, pipeline_id: PipelineId) -> bool {
        self.state.lock().running.contains(&pipeline_id)
    }

    /// Successfully enqueued run requests, in order.
    pub fn enqueued(&self) -> Vec<DispatchDecision> {
        self.state.lock().enqueued.clone()
    }

    pub fn enqueue_attempts(&self) -> usize {
        self.state.lock().enqueue_attempts
    }

    /// Let `n` more enqueues succeed, then fail the rest.
    pub fn fail_enqueue_after(&self, n: usize) {
        let mut state = self.state.lock();
        state.fail_enqueue_after = Some(state.enqueued.len() + n);
    }

    /// Stop failing enqueues.
    pub fn clear_enqueue_failures(&self) {
        self.state.lock().fail_enqueue_after = None;
    }

    pub fn set_fail_busy_checks(&self, fail: bool) {
        self.state.lock().fail_busy_checks = fail;
    }

    pub fn busy_query_count(&self) -> usize {
        self.state.lock().busy_queries.len()
    }

    /// IDs passed to the most recent busy check.
    pub fn last_busy_query(&self) -> Vec<PipelineId> {
        self.state
            .lock()
            .busy_queries
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

impl TaskQueue for MemoryExecutionLedger {
    fn enqueue<'a>(&'a self, decision: &'a DispatchDecision) -> BoxFuture<'a, DispatchResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.enqueue_attempts += 1;
            if state
                .fail_enqueue_after
                .is_some_and(|limit| state.enqueued.len() >= limit)
            {
                return Err(DispatchError::Enqueue {
                    pipeline_id: decision.pipeline_id,
                    reason: "memory ledger set to fail".to_string(),
                });
            }
            state.running.insert(decision.pipeline_id);
            state.enqueued.push(decision.clone());
            Ok(())
        })
    }
}

impl ExecutionStateStore for MemoryExecutionLedger {
    fn busy_pipelines<'a>(
        &'a self,
        pipeline_ids: &'a [PipelineId],
    ) -> BoxFuture<'a, DispatchResult<HashSet<PipelineId>>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.busy_queries.push(pipeline_ids.to_vec());
            if state.fail_busy_checks {
                return Err(DispatchError::BusyCheck(
                    "memory ledger set to fail".to_string(),
                ));
            }
            Ok(pipeline_ids
                .iter()
                .filter(|id| state.running.contains(*id))
                .copied()
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_running_until_complete() {
        let ledger = MemoryExecutionLedger::new();
        let p = PipelineId::random();
        let other = PipelineId::random();

        ledger.mark_running(p);
        let busy = ledger.busy_pipelines(&[p, other]).await.unwrap();
        assert_eq!(busy, HashSet::from([p]));

        ledger.complete(p);
        assert!(ledger.busy_pipelines(&[p]).await.unwrap().is_empty());
        assert_eq!(ledger.busy_query_count(), 2);
    }
}
