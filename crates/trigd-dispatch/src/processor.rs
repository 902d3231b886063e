//! Per-batch state machine.
//!
//! ```text
//! FLUSHED -> MATCHED -> FILTERED -> DISPATCHED -> COMMITTED
//!               |          |            |
//!               +----------+------------+--> FAILED (rewind, no commit)
//! ```
//!
//! Offsets are committed only after every enqueue of the batch succeeded.
//! A failed batch rewinds the stream to its earliest positions so the same
//! records are read again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use trigd_core::{BatchState, StreamPosition};
use trigd_ingest::{Batch, SignalStream};
use trigd_telemetry::Metrics;

use crate::dispatcher::{select_winners, Dispatcher};
use crate::error::DispatchResult;
use crate::gate::IdempotencyGate;
use crate::matcher::MatchEngine;

/// Final report for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub batch_id: u64,
    /// `Committed`, `Failed`, or `Dispatched` when the offset commit failed.
    pub state: BatchState,
    pub generation: u64,
    pub events: usize,
    pub candidates: usize,
    pub skipped_running: usize,
    pub dispatched: usize,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl BatchOutcome {
    fn new(batch: &Batch) -> Self {
        Self {
            batch_id: batch.id,
            state: BatchState::Accumulating,
            generation: 0,
            events: batch.len(),
            candidates: 0,
            skipped_running: 0,
            dispatched: 0,
            error: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state == BatchState::Committed
    }

    pub fn is_failed(&self) -> bool {
        self.state == BatchState::Failed
    }

    /// Metric label for the final state.
    fn label(&self) -> &'static str {
        match self.state {
            BatchState::Committed => "committed",
            BatchState::Failed => "failed",
            _ => "uncommitted",
        }
    }
}

/// Drives a flushed batch to a final state.
pub struct BatchProcessor {
    engine: MatchEngine,
    gate: IdempotencyGate,
    dispatcher: Dispatcher,
    stream: Arc<dyn SignalStream>,
}

impl BatchProcessor {
    pub fn new(
        engine: MatchEngine,
        gate: IdempotencyGate,
        dispatcher: Dispatcher,
        stream: Arc<dyn SignalStream>,
    ) -> Self {
        Self {
            engine,
            gate,
            dispatcher,
            stream,
        }
    }

    /// Match, gate, dispatch and commit one batch.
    pub async fn process(&self, batch: &Batch) -> BatchOutcome {
        let started = Instant::now();
        let mut outcome = BatchOutcome::new(batch);

        match self.dispatch(batch, &mut outcome).await {
            Ok(()) => self.commit(batch, &mut outcome).await,
            Err(e) => {
                Metrics::dispatch_failed(e.stage());
                error!(
                    batch_id = batch.id,
                    state = %outcome.state,
                    error = %e,
                    "Batch failed, offsets not committed"
                );
                debug_assert!(outcome.state.can_transition_to(BatchState::Failed));
                outcome.state = BatchState::Failed;
                outcome.error = Some(e.to_string());
                self.rewind(batch).await;
            }
        }

        outcome.elapsed = started.elapsed();
        let elapsed_ms = outcome.elapsed.as_secs_f64() * 1000.0;
        Metrics::batch_finished(outcome.label(), elapsed_ms);
        info!(
            batch_id = outcome.batch_id,
            trigger = %batch.trigger,
            size = outcome.events,
            generation = outcome.generation,
            candidates = outcome.candidates,
            skipped_running = outcome.skipped_running,
            dispatched = outcome.dispatched,
            state = %outcome.state,
            elapsed_ms,
            "Batch processed"
        );
        outcome
    }

    /// FLUSHED through DISPATCHED.
    async fn dispatch(&self, batch: &Batch, outcome: &mut BatchOutcome) -> DispatchResult<()> {
        outcome.state.advance(BatchState::Flushed)?;

        let matched = self.engine.match_batch(&batch.events);
        outcome.generation = matched.generation;
        outcome.candidates = matched.candidates.len();
        Metrics::candidates(matched.candidates.len());
        outcome.state.advance(BatchState::Matched)?;

        let gated = self.gate.filter(matched.candidates).await?;
        outcome.skipped_running = gated.skipped;
        outcome.state.advance(BatchState::Filtered)?;

        let winners = select_winners(gated.passed);
        let decisions = self.dispatcher.dispatch(&winners, &batch.events).await?;
        outcome.dispatched = decisions.len();
        outcome.state.advance(BatchState::Dispatched)?;
        Ok(())
    }

    /// DISPATCHED -> COMMITTED. A failed commit leaves the batch
    /// uncommitted; the stream redelivers from the last committed offset.
    async fn commit(&self, batch: &Batch, outcome: &mut BatchOutcome) {
        let latest = StreamPosition::latest_per_partition(&batch.positions);
        if !latest.is_empty() {
            if let Err(e) = self.stream.commit(&latest).await {
                Metrics::offset_commit_failed();
                warn!(
                    batch_id = batch.id,
                    error = %e,
                    "Offset commit failed, batch will be redelivered"
                );
                outcome.error = Some(e.to_string());
                return;
            }
        }
        if let Err(e) = outcome.state.advance(BatchState::Committed) {
            outcome.error = Some(e.to_string());
        }
    }

    async fn rewind(&self, batch: &Batch) {
        let earliest = StreamPosition::earliest_per_partition(&batch.positions);
        if earliest.is_empty() {
            return;
        }
        if let Err(e) = self.stream.rewind(&earliest).await {
            error!(batch_id = batch.id, error = %e, "Stream rewind failed");
        }
    }
}
