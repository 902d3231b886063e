//! Background cache refresh.
//!
//! Reloads the pipeline source on a fixed interval, builds a fresh
//! generation off to the side and swaps it in. A failed or timed-out load
//! keeps the previous generation live.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trigd_telemetry::Metrics;

use crate::cache::PipelineCache;
use crate::error::{CacheError, CacheResult};
use crate::generation::CacheGeneration;
use crate::source::PipelineSource;

/// Refresher timing.
#[derive(Debug, Clone, Copy)]
pub struct RefresherConfig {
    /// Time between refresh cycles.
    pub interval: Duration,
    /// Upper bound on one source load.
    pub load_timeout: Duration,
}

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            load_timeout: Duration::from_secs(10),
        }
    }
}

/// Periodically rebuilds the [`PipelineCache`] from a [`PipelineSource`].
pub struct CacheRefresher {
    source: Arc<dyn PipelineSource>,
    cache: Arc<PipelineCache>,
    config: RefresherConfig,
    next_generation: AtomicU64,
}

impl CacheRefresher {
    pub fn new(
        source: Arc<dyn PipelineSource>,
        cache: Arc<PipelineCache>,
        config: RefresherConfig,
    ) -> Self {
        let next_generation = AtomicU64::new(cache.generation() + 1);
        Self {
            source,
            cache,
            config,
            next_generation,
        }
    }

    pub fn cache(&self) -> &Arc<PipelineCache> {
        &self.cache
    }

    /// Run one refresh cycle now.
    ///
    /// On success the new generation is live when this returns. On failure
    /// the cache is untouched.
    pub async fn refresh_now(&self) -> CacheResult<Arc<CacheGeneration>> {
        let started = Instant::now();
        let timeout_ms = self.config.load_timeout.as_millis() as u64;

        let loaded =
            match tokio::time::timeout(self.config.load_timeout, self.source.load_pipelines())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(CacheError::Timeout(timeout_ms)),
            };
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let records = match loaded {
            Ok(records) => records,
            Err(e) => {
                let label = match e {
                    CacheError::Timeout(_) => "timeout",
                    _ => "error",
                };
                Metrics::cache_refresh(label, elapsed_ms);
                return Err(e);
            }
        };

        let record_count = records.len();
        let generation_no = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let generation = CacheGeneration::build(generation_no, records);
        let (pipelines, instruments) = (generation.pipeline_count(), generation.instrument_count());

        self.cache.swap(generation);
        let live = self.cache.snapshot();

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        Metrics::cache_refresh("ok", elapsed_ms);
        Metrics::cache_generation(generation_no, pipelines, instruments);
        debug!(
            generation = generation_no,
            records = record_count,
            pipelines,
            instruments,
            elapsed_ms,
            "Pipeline cache refreshed"
        );

        Ok(live)
    }

    /// Refresh on every interval tick until `shutdown` is cancelled.
    ///
    /// The first tick fires one full interval after start; callers are
    /// expected to have run [`Self::refresh_now`] once already.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.config.interval,
            self.config.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            "Pipeline cache refresher started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_now().await {
                        warn!(
                            error = %e,
                            generation = self.cache.generation(),
                            "Pipeline cache refresh failed, keeping previous generation"
                        );
                    }
                }
            }
        }

        info!("Pipeline cache refresher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{PipelineRecord, StaticPipelineSource};
    use trigd_core::{BoxFuture, OwnerId, PipelineId};
    use uuid::Uuid;

    fn record(tickers: &[&str]) -> PipelineRecord {
        PipelineRecord::signal_triggered(
            PipelineId::random(),
            OwnerId::new(Uuid::new_v4()),
            tickers.iter().copied(),
        )
    }

    fn refresher(source: Arc<StaticPipelineSource>, config: RefresherConfig) -> CacheRefresher {
        CacheRefresher::new(source, Arc::new(PipelineCache::new()), config)
    }

    struct SlowSource;

    impl PipelineSource for SlowSource {
        fn load_pipelines(&self) -> BoxFuture<'_, CacheResult<Vec<PipelineRecord>>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(Vec::new())
            })
        }
    }

    #[tokio::test]
    async fn test_refresh_now_installs_new_generation() {
        let source = StaticPipelineSource::shared(vec![record(&["AAPL"])]);
        let refresher = refresher(Arc::clone(&source), RefresherConfig::default());

        let live = refresher.refresh_now().await.unwrap();
        assert_eq!(live.generation(), 1);
        assert_eq!(refresher.cache().lookup("AAPL").len(), 1);

        source.set_records(vec![record(&["MSFT"]), record(&["MSFT", "TSLA"])]);
        let live = refresher.refresh_now().await.unwrap();
        assert_eq!(live.generation(), 2);
        assert!(refresher.cache().lookup("AAPL").is_empty());
        assert_eq!(refresher.cache().lookup("MSFT").len(), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_generation() {
        let source = StaticPipelineSource::shared(vec![record(&["AAPL"])]);
        let refresher = refresher(Arc::clone(&source), RefresherConfig::default());
        refresher.refresh_now().await.unwrap();

        source.set_failing(true);
        source.set_records(Vec::new());
        assert!(matches!(
            refresher.refresh_now().await,
            Err(CacheError::Source(_))
        ));
        assert_eq!(refresher.cache().generation(), 1);
        assert_eq!(refresher.cache().lookup("AAPL").len(), 1);

        // Generation numbers stay contiguous across failures.
        source.set_failing(false);
        assert_eq!(refresher.refresh_now().await.unwrap().generation(), 2);
    }

    #[tokio::test]
    async fn test_refresh_times_out() {
        let cache = Arc::new(PipelineCache::new());
        let refresher = CacheRefresher::new(
            Arc::new(SlowSource),
            Arc::clone(&cache),
            RefresherConfig {
                interval: Duration::from_secs(30),
                load_timeout: Duration::from_millis(20),
            },
        );

        assert!(matches!(
            refresher.refresh_now().await,
            Err(CacheError::Timeout(20))
        ));
        assert_eq!(cache.generation(), 0);
    }

    #[tokio::test]
    async fn test_run_refreshes_until_cancelled() {
        let source = StaticPipelineSource::shared(vec![record(&["AAPL"])]);
        let refresher = Arc::new(refresher(
            Arc::clone(&source),
            RefresherConfig {
                interval: Duration::from_millis(10),
                load_timeout: Duration::from_secs(1),
            },
        ));
        let shutdown = CancellationToken::new();

        let handle = {
            let refresher = Arc::clone(&refresher);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { refresher.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(source.load_count() >= 2);
        assert!(refresher.cache().generation() >= 2);
    }
}
