//! Signal to pipeline matching.
//!
//! For every ticker of every event, candidate pipelines come from the cache
//! index; each candidate is then checked against its subscription filters.
//! Filters are ORed; the criteria inside one filter are ANDed. A pipeline
//! with no filters matches any signal on a ticker it tracks.

use std::sync::Arc;

use trigd_cache::PipelineCache;
use trigd_core::{
    CandidatePair, FilterCriterion, PipelineCacheEntry, SignalEvent, SubscriptionFilter,
    TickerSignal,
};

/// Match output for one batch.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Cache generation every lookup in the batch was served from.
    pub generation: u64,
    /// One pair per (pipeline, event, ticker) match, in batch order.
    pub candidates: Vec<CandidatePair>,
}

/// Evaluates batches against the pipeline cache.
pub struct MatchEngine {
    cache: Arc<PipelineCache>,
}

impl MatchEngine {
    pub fn new(cache: Arc<PipelineCache>) -> Self {
        Self { cache }
    }

    /// Match every event of a batch against one cache snapshot.
    pub fn match_batch(&self, events: &[SignalEvent]) -> MatchResult {
        let snapshot = self.cache.snapshot();
        let mut candidates = Vec::new();

        for (event_index, event) in events.iter().enumerate() {
            for ticker in &event.tickers {
                for entry in snapshot.lookup(&ticker.ticker) {
                    if entry_matches(entry, event, ticker) {
                        candidates.push(CandidatePair {
                            pipeline_id: entry.pipeline_id,
                            owner_id: entry.owner_id,
                            signal_id: event.signal_id.clone(),
                            signal_type: event.signal_type.clone(),
                            matched_ticker: ticker.ticker.clone(),
                            direction: ticker.direction,
                            confidence: ticker.confidence,
                            event_index,
                        });
                    }
                }
            }
        }

        MatchResult {
            generation: snapshot.generation(),
            candidates,
        }
    }
}

/// Whether a cached pipeline reacts to this ticker of this event.
pub fn entry_matches(entry: &PipelineCacheEntry, event: &SignalEvent, ticker: &TickerSignal) -> bool {
    entry.is_unfiltered()
        || entry
            .filters
            .iter()
            .any(|filter| filter_matches(filter, event, ticker.confidence))
}

/// Whether every criterion the filter specifies holds.
///
/// A timeframe criterion never matches a signal without a timeframe.
pub fn filter_matches(filter: &SubscriptionFilter, event: &SignalEvent, confidence: f64) -> bool {
    filter.criteria().all(|criterion| match criterion {
        FilterCriterion::SignalType(signal_type) => event.signal_type == signal_type,
        FilterCriterion::MinConfidence(min) => confidence >= min,
        FilterCriterion::Timeframe(timeframe) => event.timeframe() == Some(timeframe),
    })
}
