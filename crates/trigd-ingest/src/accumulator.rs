//! Batch accumulation for validated signals.
//!
//! Buffers signal events and their stream positions and cuts a [`Batch`]
//! when either trigger fires first:
//!
//! - Size: the buffer holds `batch_size` events, or `batch_size` records
//!   counting skipped ones
//! - Timeout: `batch_timeout` has elapsed since the first buffered record
//!
//! A batch may carry only skipped positions; processing it just commits
//! them.
//!
//! The accumulator owns no timer. Callers pass `now` in and sleep until
//! [`BatchAccumulator::deadline`], which keeps flush timing deterministic
//! under a paused clock.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use trigd_core::{FlushTrigger, SignalEvent, StreamPosition};
use trigd_telemetry::Metrics;

// ============================================================================
// BatchConfig
// ============================================================================

/// Flush thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Events per batch before a size flush.
    pub batch_size: usize,
    /// Maximum age of the oldest buffered record.
    pub batch_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            batch_timeout: Duration::from_millis(500),
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

/// A flushed group of events plus every stream position it covers.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Monotonic per-process batch number.
    pub id: u64,
    pub events: Vec<SignalEvent>,
    /// Positions of the events and of any malformed records skipped since
    /// the previous flush.
    pub positions: Vec<StreamPosition>,
    pub trigger: FlushTrigger,
    pub flushed_at: Instant,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ============================================================================
// BatchAccumulator
// ============================================================================

/// Single-producer buffer that turns a signal stream into batches.
#[derive(Debug)]
pub struct BatchAccumulator {
    config: BatchConfig,
    events: Vec<SignalEvent>,
    positions: Vec<StreamPosition>,
    /// When the first unflushed record arrived.
    first_buffered_at: Option<Instant>,
    next_batch_id: u64,
}

impl BatchAccumulator {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            events: Vec::with_capacity(config.batch_size),
            positions: Vec::with_capacity(config.batch_size),
            config,
            first_buffered_at: None,
            next_batch_id: 1,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Buffer a valid event. Returns the batch if this filled it.
    pub fn push(
        &mut self,
        event: SignalEvent,
        position: StreamPosition,
        now: Instant,
    ) -> Option<Batch> {
        self.first_buffered_at.get_or_insert(now);
        self.events.push(event);
        self.positions.push(position);

        if self.events.len() >= self.config.batch_size {
            self.take(FlushTrigger::Size, now)
        } else {
            None
        }
    }

    /// Remember a skipped record's position so it commits with the next
    /// batch. Returns the batch if the buffer reached `batch_size` records.
    pub fn push_skipped(&mut self, position: StreamPosition, now: Instant) -> Option<Batch> {
        self.first_buffered_at.get_or_insert(now);
        self.positions.push(position);

        if self.positions.len() >= self.config.batch_size {
            self.take(FlushTrigger::Size, now)
        } else {
            None
        }
    }

    /// When the buffer must be flushed, if anything is buffered.
    pub fn deadline(&self) -> Option<Instant> {
        self.first_buffered_at
            .map(|first| first + self.config.batch_timeout)
    }

    /// Flush if the oldest buffered record has reached `batch_timeout`.
    ///
    /// No-op on an empty buffer.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<Batch> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.take(FlushTrigger::Timeout, now),
            _ => None,
        }
    }

    /// Flush whatever is left, including skipped-only positions.
    pub fn flush_remaining(&mut self, now: Instant) -> Option<Batch> {
        if self.events.is_empty() && self.positions.is_empty() {
            return None;
        }
        self.take(FlushTrigger::Shutdown, now)
    }

    /// Buffered events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Buffered positions, skipped records included.
    pub fn buffered_positions(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn take(&mut self, trigger: FlushTrigger, now: Instant) -> Option<Batch> {
        let id = self.next_batch_id;
        self.next_batch_id += 1;
        self.first_buffered_at = None;

        let events = std::mem::replace(&mut self.events, Vec::with_capacity(self.config.batch_size));
        let positions =
            std::mem::replace(&mut self.positions, Vec::with_capacity(self.config.batch_size));

        Metrics::batch_flushed(trigger.as_str(), events.len());
        debug!(
            batch_id = id,
            size = events.len(),
            positions = positions.len(),
            %trigger,
            "Batch flushed"
        );

        Some(Batch {
            id,
            events,
            positions,
            trigger,
            flushed_at: now,
        })
    }
}
