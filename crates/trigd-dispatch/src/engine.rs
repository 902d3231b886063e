//! Consumption loop.
//!
//! Single task that pulls signals, feeds the accumulator and processes each
//! flushed batch inline. Pulling pauses while a batch is processed, so at
//! most one batch is in flight and offsets commit in stream order.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trigd_ingest::{Batch, BatchAccumulator, BatchConfig, Ingested, SignalIngestor};
use trigd_telemetry::Metrics;

use crate::processor::{BatchOutcome, BatchProcessor};

/// Loop configuration.
#[derive(Debug, Clone, Copy)]
pub struct DispatchLoopConfig {
    pub batch: BatchConfig,
    /// Pause after a failed batch or a stream error.
    pub failure_backoff: Duration,
}

impl Default for DispatchLoopConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::default(),
            failure_backoff: Duration::from_millis(1000),
        }
    }
}

/// Totals for one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub batches: u64,
    pub committed: u64,
    pub failed: u64,
    pub dispatched: u64,
    pub stream_errors: u64,
}

impl LoopSummary {
    fn record(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        self.dispatched += outcome.dispatched as u64;
        if outcome.is_committed() {
            self.committed += 1;
        } else if outcome.is_failed() {
            self.failed += 1;
        }
    }
}

/// Stream -> accumulator -> processor loop.
pub struct DispatchLoop {
    ingestor: SignalIngestor,
    accumulator: BatchAccumulator,
    processor: BatchProcessor,
    failure_backoff: Duration,
}

impl DispatchLoop {
    pub fn new(ingestor: SignalIngestor, processor: BatchProcessor, config: DispatchLoopConfig) -> Self {
        Self {
            ingestor,
            accumulator: BatchAccumulator::new(config.batch),
            processor,
            failure_backoff: config.failure_backoff,
        }
    }

    /// Run until `shutdown` is cancelled or the stream ends.
    ///
    /// Whatever is still buffered on exit is flushed and processed once
    /// more before returning.
    pub async fn run(mut self, shutdown: CancellationToken) -> LoopSummary {
        let mut summary = LoopSummary::default();
        info!(
            batch_size = self.accumulator.config().batch_size,
            batch_timeout_ms = self.accumulator.config().batch_timeout.as_millis() as u64,
            "Dispatch loop started"
        );

        loop {
            let deadline = self.accumulator.deadline();

            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping ingestion");
                    break;
                }

                () = sleep_until(deadline) => {
                    if let Some(batch) = self.accumulator.poll_timeout(Instant::now()) {
                        self.handle(batch, &mut summary, &shutdown).await;
                    }
                }

                pulled = self.ingestor.next() => match pulled {
                    Ok(Some(Ingested::Signal { event, position })) => {
                        if let Some(batch) = self.accumulator.push(event, position, Instant::now()) {
                            self.handle(batch, &mut summary, &shutdown).await;
                        }
                    }
                    Ok(Some(Ingested::Skipped { position, .. })) => {
                        if let Some(batch) = self.accumulator.push_skipped(position, Instant::now()) {
                            self.handle(batch, &mut summary, &shutdown).await;
                        }
                    }
                    Ok(None) => {
                        info!("Signal stream ended");
                        break;
                    }
                    Err(e) => {
                        summary.stream_errors += 1;
                        Metrics::stream_error();
                        warn!(
                            error = %e,
                            backoff_ms = self.failure_backoff.as_millis() as u64,
                            "Stream pull failed, backing off"
                        );
                        self.backoff(&shutdown).await;
                    }
                },
            }
        }

        if let Some(batch) = self.accumulator.flush_remaining(Instant::now()) {
            let outcome = self.processor.process(&batch).await;
            summary.record(&outcome);
        }

        info!(
            batches = summary.batches,
            committed = summary.committed,
            failed = summary.failed,
            dispatched = summary.dispatched,
            "Dispatch loop stopped"
        );
        summary
    }

    async fn handle(&self, batch: Batch, summary: &mut LoopSummary, shutdown: &CancellationToken) {
        let outcome = self.processor.process(&batch).await;
        summary.record(&outcome);
        if outcome.is_failed() {
            self.backoff(shutdown).await;
        }
    }

    /// Cancellation-aware sleep.
    async fn backoff(&self, shutdown: &CancellationToken) {
        tokio::select! {
            () = tokio::time::sleep(self.failure_backoff) => {}
            () = shutdown.cancelled() => {}
        }
    }
}

/// Sleep until the flush deadline; never completes without one.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
