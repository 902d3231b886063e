//! Immutable cache generation.
//!
//! A generation is built once from a full source load and never mutated
//! afterwards. Lookups are by normalized ticker.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use trigd_core::{normalize_ticker, PipelineCacheEntry};

use crate::source::PipelineRecord;

/// One complete, consistent view of the signal-triggered pipelines.
#[derive(Debug)]
pub struct CacheGeneration {
    generation: u64,
    loaded_at: DateTime<Utc>,
    /// ticker -> pipelines tracking it
    index: HashMap<String, Vec<Arc<PipelineCacheEntry>>>,
    pipeline_count: usize,
}

impl CacheGeneration {
    /// Generation 0: nothing loaded yet.
    pub fn empty() -> Self {
        Self {
            generation: 0,
            loaded_at: Utc::now(),
            index: HashMap::new(),
            pipeline_count: 0,
        }
    }

    /// Build a generation from a full source load.
    ///
    /// Inactive and non-signal records are dropped, tickers are normalized,
    /// and pipelines left with no instruments are skipped.
    pub fn build(generation: u64, records: Vec<PipelineRecord>) -> Self {
        let mut index: HashMap<String, Vec<Arc<PipelineCacheEntry>>> = HashMap::new();
        let mut pipeline_count = 0;

        for record in records {
            if !record.is_eligible() {
                continue;
            }

            let instruments: HashSet<String> = record
                .tickers
                .iter()
                .filter_map(|t| normalize_ticker(t))
                .collect();
            if instruments.is_empty() {
                debug!(
                    pipeline_id = %record.pipeline_id,
                    "Skipping pipeline with no tracked instruments"
                );
                continue;
            }

            let entry = Arc::new(PipelineCacheEntry {
                pipeline_id: record.pipeline_id,
                owner_id: record.owner_id,
                instruments,
                filters: record.filters,
            });
            for ticker in &entry.instruments {
                index
                    .entry(ticker.clone())
                    .or_default()
                    .push(Arc::clone(&entry));
            }
            pipeline_count += 1;
        }

        Self {
            generation,
            loaded_at: Utc::now(),
            index,
            pipeline_count,
        }
    }

    /// Pipelines tracking `ticker` (raw or normalized).
    pub fn lookup(&self, ticker: &str) -> &[Arc<PipelineCacheEntry>] {
        normalize_ticker(ticker)
            .and_then(|t| self.index.get(&t))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipeline_count
    }

    /// Distinct tracked tickers.
    pub fn instrument_count(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipeline_count == 0
    }
}
