//! Periodic dispatch statistics summary.
//!
//! Reads the Prometheus counters and logs batch-level throughput and skip
//! rates without replaying payloads:
//! - signals received / malformed and signals per second
//! - batches committed / failed / uncommitted
//! - candidate pairs, skipped-as-running rate, dispatched run requests
//! - batch processing time distribution (P50/P95/P99) over the same period
//!
//! All counts are relative to when the reporter was created.

use crate::metrics::{
    BATCHES_TOTAL, BATCH_DURATION_MS, CANDIDATES_TOTAL, DISPATCHED_TOTAL, SIGNALS_MALFORMED_TOTAL,
    SIGNALS_RECEIVED_TOTAL, SKIPPED_RUNNING_TOTAL,
};
use chrono::{DateTime, Utc};
use prometheus::core::Collector;
use serde::Serialize;
use tracing::info;

/// Snapshot of dispatch statistics since the reporter started.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchStats {
    pub signals_received: u64,
    pub signals_malformed: u64,
    pub batches_committed: u64,
    pub batches_failed: u64,
    pub batches_uncommitted: u64,
    pub candidates: u64,
    pub skipped_running: u64,
    pub dispatched: u64,
    /// skipped_running / candidates (0 when no candidates).
    pub skip_rate: f64,
    pub signals_per_sec: f64,
    pub batch_p50_ms: f64,
    pub batch_p95_ms: f64,
    pub batch_p99_ms: f64,
    pub elapsed_secs: i64,
}

/// Cumulative bucket counts of the batch duration histogram.
#[derive(Debug, Clone, Default, PartialEq)]
struct HistogramSnapshot {
    count: u64,
    /// (upper bound, cumulative count)
    buckets: Vec<(f64, u64)>,
}

impl HistogramSnapshot {
    fn capture() -> Self {
        BATCH_DURATION_MS
            .collect()
            .iter()
            .flat_map(|mf| mf.get_metric().first())
            .map(|m| {
                let h = m.get_histogram();
                Self {
                    count: h.get_sample_count(),
                    buckets: h
                        .get_bucket()
                        .iter()
                        .map(|b| (b.get_upper_bound(), b.get_cumulative_count()))
                        .collect(),
                }
            })
            .next()
            .unwrap_or_default()
    }

    /// Observations made after `base`.
    fn since(&self, base: &Self) -> Self {
        let buckets = self
            .buckets
            .iter()
            .enumerate()
            .map(|(i, &(bound, count))| {
                let before = base.buckets.get(i).map_or(0, |&(_, c)| c);
                (bound, count.saturating_sub(before))
            })
            .collect();
        Self {
            count: self.count.saturating_sub(base.count),
            buckets,
        }
    }

    /// (p50, p95, p99); zeros when empty.
    fn percentiles(&self) -> (f64, f64, f64) {
        if self.count == 0 {
            return (0.0, 0.0, 0.0);
        }
        (
            percentile_from_buckets(&self.buckets, self.count, 0.50),
            percentile_from_buckets(&self.buckets, self.count, 0.95),
            percentile_from_buckets(&self.buckets, self.count, 0.99),
        )
    }
}

#[derive(Debug, Clone, Default)]
struct Baseline {
    signals_received: u64,
    signals_malformed: u64,
    batches_committed: u64,
    batches_failed: u64,
    batches_uncommitted: u64,
    candidates: u64,
    skipped_running: u64,
    dispatched: u64,
    batch_durations: HistogramSnapshot,
}

impl Baseline {
    fn capture() -> Self {
        Self {
            signals_received: sum_counter_vec(&SIGNALS_RECEIVED_TOTAL),
            signals_malformed: sum_counter_vec(&SIGNALS_MALFORMED_TOTAL),
            batches_committed: BATCHES_TOTAL.with_label_values(&["committed"]).get(),
            batches_failed: BATCHES_TOTAL.with_label_values(&["failed"]).get(),
            batches_uncommitted: BATCHES_TOTAL.with_label_values(&["uncommitted"]).get(),
            candidates: CANDIDATES_TOTAL.get(),
            skipped_running: SKIPPED_RUNNING_TOTAL.get(),
            dispatched: sum_counter_vec(&DISPATCHED_TOTAL),
            batch_durations: HistogramSnapshot::capture(),
        }
    }
}

/// Dispatch statistics reporter.
pub struct DispatchStatsReporter {
    start_time: DateTime<Utc>,
    baseline: Baseline,
}

impl DispatchStatsReporter {
    /// Create a reporter; counts start from the current counter values.
    pub fn new() -> Self {
        Self {
            start_time: Utc::now(),
            baseline: Baseline::capture(),
        }
    }

    /// Current statistics relative to the baseline.
    pub fn get_stats(&self) -> DispatchStats {
        let now = Baseline::capture();
        let base = &self.baseline;
        let elapsed = Utc::now() - self.start_time;
        let elapsed_secs = elapsed.num_seconds();

        let signals_received = now.signals_received.saturating_sub(base.signals_received);
        let candidates = now.candidates.saturating_sub(base.candidates);
        let skipped_running = now.skipped_running.saturating_sub(base.skipped_running);

        let skip_rate = if candidates > 0 {
            skipped_running as f64 / candidates as f64
        } else {
            0.0
        };
        let elapsed_ms = elapsed.num_milliseconds();
        let signals_per_sec = if elapsed_ms > 0 {
            signals_received as f64 * 1000.0 / elapsed_ms as f64
        } else {
            0.0
        };

        let (batch_p50_ms, batch_p95_ms, batch_p99_ms) = now
            .batch_durations
            .since(&base.batch_durations)
            .percentiles();

        DispatchStats {
            signals_received,
            signals_malformed: now.signals_malformed.saturating_sub(base.signals_malformed),
            batches_committed: now.batches_committed.saturating_sub(base.batches_committed),
            batches_failed: now.batches_failed.saturating_sub(base.batches_failed),
            batches_uncommitted: now
                .batches_uncommitted
                .saturating_sub(base.batches_uncommitted),
            candidates,
            skipped_running,
            dispatched: now.dispatched.saturating_sub(base.dispatched),
            skip_rate,
            signals_per_sec,
            batch_p50_ms,
            batch_p95_ms,
            batch_p99_ms,
            elapsed_secs,
        }
    }

    /// Output the summary to logs.
    pub fn output_summary(&self) {
        let s = self.get_stats();
        let hours = s.elapsed_secs / 3600;
        let minutes = (s.elapsed_secs / 60) % 60;

        info!("========== Dispatch Statistics Summary ==========");
        info!(
            "Period: {} ({} hours {} minutes)",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            hours,
            minutes
        );
        info!(
            "  Signals: {} received, {} malformed ({:.1}/s)",
            s.signals_received, s.signals_malformed, s.signals_per_sec
        );
        info!(
            "  Batches: {} committed, {} failed, {} uncommitted",
            s.batches_committed, s.batches_failed, s.batches_uncommitted
        );
        info!(
            "  Candidates: {} (skipped as running: {}, {:.2}%)",
            s.candidates,
            s.skipped_running,
            s.skip_rate * 100.0
        );
        info!("  Dispatched: {}", s.dispatched);
        info!(
            "  Batch time (ms): P50={:.1}, P95={:.1}, P99={:.1}",
            s.batch_p50_ms, s.batch_p95_ms, s.batch_p99_ms
        );
        info!("=================================================");
    }
}

impl Default for DispatchStatsReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum a counter vec across all label combinations.
fn sum_counter_vec(counter: &prometheus::IntCounterVec) -> u64 {
    counter
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric().iter())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Percentile from cumulative histogram buckets, linear within a bucket.
fn percentile_from_buckets(buckets: &[(f64, u64)], total_count: u64, percentile: f64) -> f64 {
    let target = (total_count as f64 * percentile).ceil() as u64;
    let mut prev_bound = 0.0;
    let mut prev_count = 0u64;

    for &(upper_bound, cumulative_count) in buckets {
        if cumulative_count >= target {
            let bucket_count = cumulative_count - prev_count;
            if bucket_count == 0 {
                return upper_bound;
            }
            let position = (target - prev_count) as f64 / bucket_count as f64;
            return prev_bound + position * (upper_bound - prev_bound);
        }

        prev_bound = upper_bound;
        prev_count = cumulative_count;
    }

    buckets.last().map_or(0.0, |&(bound, _)| bound)
}
