//! Pipeline cache with atomic generation swap.
//!
//! Readers clone the current `Arc<CacheGeneration>` under a read lock and
//! then work lock-free on that snapshot; the refresher replaces the pointer
//! under a write lock. Neither side holds the lock across any other work.

use std::sync::Arc;

use parking_lot::RwLock;
use trigd_core::PipelineCacheEntry;

use crate::generation::CacheGeneration;

/// Shared, generation-swapped pipeline cache.
#[derive(Debug)]
pub struct PipelineCache {
    current: RwLock<Arc<CacheGeneration>>,
}

impl PipelineCache {
    /// Create an empty cache (generation 0).
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(CacheGeneration::empty())),
        }
    }

    /// The live generation.
    ///
    /// Hold on to the returned snapshot for a whole batch so every lookup
    /// in that batch sees the same generation.
    pub fn snapshot(&self) -> Arc<CacheGeneration> {
        Arc::clone(&self.current.read())
    }

    /// Pipelines tracking `ticker` in the live generation.
    pub fn lookup(&self, ticker: &str) -> Vec<Arc<PipelineCacheEntry>> {
        self.snapshot().lookup(ticker).to_vec()
    }

    /// Install `next` as the live generation and return the previous one.
    pub fn swap(&self, next: CacheGeneration) -> Arc<CacheGeneration> {
        let next = Arc::new(next);
        std::mem::replace(&mut *self.current.write(), next)
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation()
    }

    /// Whether any generation has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.generation() > 0
    }
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PipelineRecord;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use trigd_core::{OwnerId, PipelineId};
    use uuid::Uuid;

    fn generation_for(generation: u64, pipeline: PipelineId, tickers: &[&str]) -> CacheGeneration {
        CacheGeneration::build(
            generation,
            vec![PipelineRecord::signal_triggered(
                pipeline,
                OwnerId::new(Uuid::new_v4()),
                tickers.iter().copied(),
            )],
        )
    }

    #[test]
    fn test_new_cache_is_empty() {
        let cache = PipelineCache::new();
        assert_eq!(cache.generation(), 0);
        assert!(!cache.is_loaded());
        assert!(cache.lookup("AAPL").is_empty());
    }

    #[test]
    fn test_swap_returns_previous_generation() {
        let cache = PipelineCache::new();
        let pipeline = PipelineId::random();

        let old = cache.swap(generation_for(1, pipeline, &["AAPL"]));
        assert_eq!(old.generation(), 0);
        assert_eq!(cache.generation(), 1);
        assert_eq!(cache.lookup("aapl")[0].pipeline_id, pipeline);

        let old = cache.swap(generation_for(2, pipeline, &["MSFT"]));
        assert_eq!(old.generation(), 1);
        assert!(cache.lookup("AAPL").is_empty());
        assert_eq!(cache.lookup("MSFT").len(), 1);
    }

    #[test]
    fn test_snapshot_survives_swap() {
        let cache = PipelineCache::new();
        let pipeline = PipelineId::random();
        cache.swap(generation_for(1, pipeline, &["AAPL"]));

        let snapshot = cache.snapshot();
        cache.swap(generation_for(2, pipeline, &["MSFT"]));

        // The held snapshot still answers from generation 1.
        assert_eq!(snapshot.generation(), 1);
        assert_eq!(snapshot.lookup("AAPL").len(), 1);
        assert!(snapshot.lookup("MSFT").is_empty());
    }

    #[test]
    fn test_concurrent_lookups_never_see_mixed_generation() {
        // Odd generations track only AAPL, even generations only MSFT.
        // A reader that sees both (or neither) in one snapshot saw a hybrid.
        let cache = Arc::new(PipelineCache::new());
        let pipeline = PipelineId::random();
        cache.swap(generation_for(1, pipeline, &["AAPL"]));
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let stop = Arc::clone(&stop);
                std::thread::spawn(move || {
                    let mut seen = HashSet::new();
                    while !stop.load(Ordering::Relaxed) {
                        let snap = cache.snapshot();
                        let aapl = snap.lookup("AAPL").len();
                        let msft = snap.lookup("MSFT").len();
                        assert_eq!(aapl + msft, 1, "generation {}", snap.generation());
                        if snap.generation() % 2 == 1 {
                            assert_eq!(aapl, 1);
                        } else {
                            assert_eq!(msft, 1);
                        }
                        seen.insert(snap.generation());
                    }
                    seen.len()
                })
            })
            .collect();

        for generation in 2..=200u64 {
            let tickers: &[&str] = if generation % 2 == 1 { &["AAPL"] } else { &["MSFT"] };
            cache.swap(generation_for(generation, pipeline, tickers));
        }
        stop.store(true, Ordering::Relaxed);

        for reader in readers {
            assert!(reader.join().unwrap() >= 1);
        }
        assert_eq!(cache.generation(), 200);
    }
}
