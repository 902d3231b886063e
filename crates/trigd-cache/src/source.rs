//! Pipeline source trait for cache refreshes.
//!
//! Abstracts the relational read of active signal-triggered pipelines so
//! the cache can be refreshed from Postgres in production and from a static
//! list in tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use trigd_core::{BoxFuture, OwnerId, PipelineId, SubscriptionFilter, TriggerMode};

use crate::error::{CacheError, CacheResult};

/// One pipeline row joined to its scanner tickers and filters.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRecord {
    pub pipeline_id: PipelineId,
    pub owner_id: OwnerId,
    pub is_active: bool,
    pub trigger_mode: TriggerMode,
    /// Raw scanner tickers (normalized when the generation is built).
    pub tickers: Vec<String>,
    pub filters: Vec<SubscriptionFilter>,
}

impl PipelineRecord {
    /// Active, signal-triggered record with no filters.
    pub fn signal_triggered(
        pipeline_id: PipelineId,
        owner_id: OwnerId,
        tickers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            pipeline_id,
            owner_id,
            is_active: true,
            trigger_mode: TriggerMode::Signal,
            tickers: tickers.into_iter().map(Into::into).collect(),
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: SubscriptionFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Whether this record belongs in a cache generation.
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.trigger_mode.is_signal()
    }
}

/// Source of pipeline records for cache refreshes.
///
/// Implementations must be side-effect free and safe to call every
/// refresh interval.
pub trait PipelineSource: Send + Sync {
    /// Load all active, signal-triggered pipelines.
    fn load_pipelines(&self) -> BoxFuture<'_, CacheResult<Vec<PipelineRecord>>>;
}

/// In-memory pipeline source.
///
/// Serves whatever records were last set; can be switched into a failing
/// mode to exercise refresh failure handling.
#[derive(Debug, Default)]
pub struct StaticPipelineSource {
    records: Mutex<Vec<PipelineRecord>>,
    failing: AtomicBool,
    loads: AtomicU64,
}

impl StaticPipelineSource {
    pub fn new(records: Vec<PipelineRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            failing: AtomicBool::new(false),
            loads: AtomicU64::new(0),
        }
    }

    pub fn shared(records: Vec<PipelineRecord>) -> Arc<Self> {
        Arc::new(Self::new(records))
    }

    /// Replace the records served by subsequent loads.
    pub fn set_records(&self, records: Vec<PipelineRecord>) {
        *self.records.lock() = records;
    }

    /// Make subsequent loads fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of load attempts so far.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }
}

impl PipelineSource for StaticPipelineSource {
    fn load_pipelines(&self) -> BoxFuture<'_, CacheResult<Vec<PipelineRecord>>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(CacheError::Source("static source set to fail".to_string()));
            }
            Ok(self.records.lock().clone())
        })
    }
}
