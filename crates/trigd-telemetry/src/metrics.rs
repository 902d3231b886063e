//! Prometheus metrics for the trigger dispatcher.
//!
//! Covers:
//! - Signal ingestion (received / malformed)
//! - Batch lifecycle (flush trigger, final state, size, duration)
//! - Idempotency gate skips and dispatches
//! - Pipeline cache refreshes
//! - Offset commits
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Signals accepted by the ingestor.
/// Labels: source
pub static SIGNALS_RECEIVED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trigd_signals_received_total",
        "Total valid signal events received",
        &["source"]
    )
    .unwrap()
});

/// Records dropped at ingestion.
/// Labels: reason (json/empty_tickers/confidence/...)
pub static SIGNALS_MALFORMED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trigd_signals_malformed_total",
        "Total malformed signal records skipped",
        &["reason"]
    )
    .unwrap()
});

/// Transport errors while pulling from the stream.
pub static STREAM_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trigd_stream_errors_total",
        "Total errors while pulling from the event stream"
    )
    .unwrap()
});

/// Batches by final state.
/// Labels: state (committed/failed/uncommitted)
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trigd_batches_total",
        "Total processed batches by final state",
        &["state"]
    )
    .unwrap()
});

/// Flushes by trigger.
/// Labels: trigger (size/timeout/shutdown)
pub static BATCH_FLUSH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trigd_batch_flush_total",
        "Total batch flushes by trigger",
        &["trigger"]
    )
    .unwrap()
});

/// Signals per flushed batch.
pub static BATCH_SIZE: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "trigd_batch_size",
        "Number of signal events per flushed batch",
        vec![1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0]
    )
    .unwrap()
});

/// Flush-to-final-state processing time.
pub static BATCH_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "trigd_batch_duration_ms",
        "Batch processing time from flush to final state in milliseconds",
        vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Candidate pairs produced by the match engine.
pub static CANDIDATES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trigd_candidates_total",
        "Total (pipeline, signal, ticker) candidate pairs"
    )
    .unwrap()
});

/// Candidate pairs dropped because the pipeline was already running.
pub static SKIPPED_RUNNING_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trigd_skipped_running_total",
        "Total candidate pairs skipped because the pipeline is already running"
    )
    .unwrap()
});

/// Run requests enqueued.
/// Labels: signal_type
pub static DISPATCHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trigd_dispatched_total",
        "Total pipeline run requests enqueued",
        &["signal_type"]
    )
    .unwrap()
});

/// Batch failures by failing stage.
/// Labels: stage (busy_check/enqueue)
pub static DISPATCH_FAILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trigd_dispatch_failed_total",
        "Total batch failures by stage",
        &["stage"]
    )
    .unwrap()
});

/// Cache refresh attempts.
/// Labels: result (ok/error/timeout)
pub static CACHE_REFRESH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "trigd_cache_refresh_total",
        "Total pipeline cache refresh attempts",
        &["result"]
    )
    .unwrap()
});

/// Live cache generation number.
pub static CACHE_GENERATION: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "trigd_cache_generation",
        "Generation number of the live pipeline cache"
    )
    .unwrap()
});

/// Pipelines in the live generation.
pub static CACHE_PIPELINES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "trigd_cache_pipelines",
        "Signal-triggered pipelines in the live cache generation"
    )
    .unwrap()
});

/// Distinct tickers in the live generation.
pub static CACHE_INSTRUMENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "trigd_cache_instruments",
        "Distinct tracked tickers in the live cache generation"
    )
    .unwrap()
});

/// Source query + build time.
pub static CACHE_REFRESH_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "trigd_cache_refresh_duration_ms",
        "Pipeline cache refresh duration in milliseconds",
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0, 30000.0]
    )
    .unwrap()
});

/// Offset commits that failed (stream will redeliver).
pub static OFFSET_COMMIT_FAILED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "trigd_offset_commit_failed_total",
        "Total stream offset commits that failed"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a valid signal.
    pub fn signal_received(source: &str) {
        SIGNALS_RECEIVED_TOTAL.with_label_values(&[source]).inc();
    }

    /// Record a skipped malformed record.
    pub fn signal_malformed(reason: &str) {
        SIGNALS_MALFORMED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a transport error while pulling.
    pub fn stream_error() {
        STREAM_ERRORS_TOTAL.inc();
    }

    /// Record a flush and the batch size.
    pub fn batch_flushed(trigger: &str, size: usize) {
        BATCH_FLUSH_TOTAL.with_label_values(&[trigger]).inc();
        BATCH_SIZE.observe(size as f64);
    }

    /// Record a batch reaching its final state.
    pub fn batch_finished(state: &str, duration_ms: f64) {
        BATCHES_TOTAL.with_label_values(&[state]).inc();
        BATCH_DURATION_MS.observe(duration_ms);
    }

    /// Record match engine output for a batch.
    pub fn candidates(count: usize) {
        CANDIDATES_TOTAL.inc_by(count as u64);
    }

    /// Record candidates dropped by the busy check.
    pub fn skipped_running(count: usize) {
        SKIPPED_RUNNING_TOTAL.inc_by(count as u64);
    }

    /// Record one enqueued run request.
    pub fn dispatched(signal_type: &str) {
        DISPATCHED_TOTAL.with_label_values(&[signal_type]).inc();
    }

    /// Record a batch failure at a stage.
    pub fn dispatch_failed(stage: &str) {
        DISPATCH_FAILED_TOTAL.with_label_values(&[stage]).inc();
    }

    /// Record a cache refresh attempt.
    pub fn cache_refresh(result: &str, duration_ms: f64) {
        CACHE_REFRESH_TOTAL.with_label_values(&[result]).inc();
        CACHE_REFRESH_DURATION_MS.observe(duration_ms);
    }

    /// Publish the shape of the live cache generation.
    pub fn cache_generation(generation: u64, pipelines: usize, instruments: usize) {
        CACHE_GENERATION.set(generation as i64);
        CACHE_PIPELINES.set(pipelines as i64);
        CACHE_INSTRUMENTS.set(instruments as i64);
    }

    /// Record a failed offset commit.
    pub fn offset_commit_failed() {
        OFFSET_COMMIT_FAILED_TOTAL.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = SKIPPED_RUNNING_TOTAL.get();
        Metrics::skipped_running(3);
        assert!(SKIPPED_RUNNING_TOTAL.get() >= before + 3);

        let before = DISPATCHED_TOTAL.with_label_values(&["metrics_test"]).get();
        Metrics::dispatched("metrics_test");
        assert_eq!(
            DISPATCHED_TOTAL.with_label_values(&["metrics_test"]).get(),
            before + 1
        );
    }

    #[test]
    fn test_cache_generation_gauges() {
        let _guard = cache_gauge_lock();
        Metrics::cache_generation(7, 12, 30);
        assert_eq!(CACHE_GENERATION.get(), 7);
        assert_eq!(CACHE_PIPELINES.get(), 12);
        assert_eq!(CACHE_INSTRUMENTS.get(), 30);

        Metrics::cache_generation(8, 0, 0);
        assert_eq!(CACHE_GENERATION.get(), 8);
        assert_eq!(CACHE_PIPELINES.get(), 0);
        assert_eq!(CACHE_INSTRUMENTS.get(), 0);
    }
}

/// Serializes tests that publish the process-wide cache gauges.
#[cfg(test)]
pub(crate) fn cache_gauge_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
