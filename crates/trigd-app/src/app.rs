//! Application wiring and main loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use trigd_cache::{CacheRefresher, PipelineCache, PipelineSource};
use trigd_dispatch::{
    BatchProcessor, DispatchLoop, Dispatcher, ExecutionStateStore, IdempotencyGate, LoopSummary,
    MatchEngine, TaskQueue,
};
use trigd_ingest::{SignalIngestor, SignalParser, SignalStream};
use trigd_store::{
    connect_pool, KafkaSignalStream, KafkaTaskQueue, PgExecutionStateStore, PgPipelineSource,
};
use trigd_telemetry::{serve_metrics, DispatchStatsReporter};

use crate::config::AppConfig;
use crate::error::AppResult;

/// External collaborators of the dispatch path.
#[derive(Clone)]
pub struct Components {
    pub pipeline_source: Arc<dyn PipelineSource>,
    pub signal_stream: Arc<dyn SignalStream>,
    pub execution_state: Arc<dyn ExecutionStateStore>,
    pub task_queue: Arc<dyn TaskQueue>,
}

impl Components {
    /// Postgres and Kafka adapters from configuration.
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        let pool = connect_pool(&config.pool_config()).await?;
        let pipeline_source = Arc::new(PgPipelineSource::new(pool.clone()));
        let execution_state = Arc::new(PgExecutionStateStore::new(
            pool,
            config.database.terminal_statuses.clone(),
        ));
        let signal_stream = Arc::new(KafkaSignalStream::new(&config.consumer_config())?);
        let task_queue = Arc::new(KafkaTaskQueue::new(
            &config.stream.brokers,
            &config.queue.topic,
            Duration::from_millis(config.queue.send_timeout_ms),
        )?);

        Ok(Self {
            pipeline_source,
            signal_stream,
            execution_state,
            task_queue,
        })
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    shutdown: CancellationToken,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the application when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Connect to Postgres and Kafka and run until shutdown.
    pub async fn run(self) -> AppResult<LoopSummary> {
        let components = Components::connect(&self.config).await?;
        self.run_with(components).await
    }

    /// Run with the given collaborators until ctrl-c, a cancelled
    /// shutdown token, or the end of the signal stream.
    ///
    /// Fails without consuming anything if the initial cache load fails.
    pub async fn run_with(self, components: Components) -> AppResult<LoopSummary> {
        let config = &self.config;
        let shutdown = self.shutdown.clone();

        // Initial cache load must succeed before any signal is consumed
        let cache = Arc::new(PipelineCache::new());
        let refresher = Arc::new(CacheRefresher::new(
            components.pipeline_source,
            Arc::clone(&cache),
            config.refresher_config(),
        ));
        let initial = refresher.refresh_now().await?;
        info!(
            generation = initial.generation(),
            pipelines = initial.pipeline_count(),
            instruments = initial.instrument_count(),
            "Initial pipeline cache loaded"
        );

        let metrics_handle = self.spawn_metrics_server();
        let refresher_handle = {
            let refresher = Arc::clone(&refresher);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { refresher.run(shutdown).await })
        };

        let processor = BatchProcessor::new(
            MatchEngine::new(cache),
            IdempotencyGate::new(components.execution_state, config.busy_check_timeout()),
            Dispatcher::new(components.task_queue, config.enqueue_timeout()),
            Arc::clone(&components.signal_stream),
        );
        let parser =
            SignalParser::new().with_known_signal_types(config.ingest.known_signal_types.clone());
        let dispatch_loop = DispatchLoop::new(
            SignalIngestor::new(components.signal_stream, parser),
            processor,
            config.loop_config(),
        );
        let mut loop_handle = tokio::spawn(dispatch_loop.run(shutdown.clone()));

        let stats = DispatchStatsReporter::new();
        let stats_period = config.stats_interval();
        let mut stats_interval =
            tokio::time::interval_at(tokio::time::Instant::now() + stats_period, stats_period);

        info!("Entering main loop");
        let summary = loop {
            tokio::select! {
                joined = &mut loop_handle => break joined?,

                _ = stats_interval.tick() => {
                    stats.output_summary();
                }

                result = tokio::signal::ctrl_c(), if !shutdown.is_cancelled() => {
                    if let Err(e) = result {
                        warn!(?e, "Failed to listen for ctrl-c");
                        continue;
                    }
                    info!("Shutdown signal received");
                    shutdown.cancel();
                }
            }
        };

        // The loop may also end because the stream did.
        shutdown.cancel();
        if let Err(e) = refresher_handle.await {
            error!(?e, "Cache refresher task failed");
        }
        if let Some(handle) = metrics_handle {
            match handle.await {
                Ok(Err(e)) => warn!(?e, "Metrics server error"),
                Err(e) => warn!(?e, "Metrics server task failed"),
                Ok(Ok(())) => {}
            }
        }

        info!("Final statistics summary:");
        stats.output_summary();
        Ok(summary)
    }

    fn spawn_metrics_server(
        &self,
    ) -> Option<JoinHandle<trigd_telemetry::TelemetryResult<()>>> {
        if !self.config.telemetry.http_enabled {
            return None;
        }
        let port = self.config.telemetry.metrics_port;
        let shutdown = self.shutdown.clone();
        Some(tokio::spawn(serve_metrics(port, shutdown)))
    }
}
