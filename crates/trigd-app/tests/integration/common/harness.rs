//! Runs an [`Application`] against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trigd_app::{AppConfig, AppResult, Application, Components};
use trigd_cache::{PipelineRecord, StaticPipelineSource};
use trigd_core::{OwnerId, PipelineId};
use trigd_dispatch::{LoopSummary, MemoryExecutionLedger};
use trigd_ingest::MemorySignalStream;
use uuid::Uuid;

/// Upper bound for any condition a test waits on.
const WAIT_LIMIT: Duration = Duration::from_secs(5);

pub struct Harness {
    pub stream: Arc<MemorySignalStream>,
    pub ledger: Arc<MemoryExecutionLedger>,
    pub source: Arc<StaticPipelineSource>,
    pub shutdown: CancellationToken,
    handle: JoinHandle<AppResult<LoopSummary>>,
}

impl Harness {
    /// Start the application in the background.
    pub fn start(config: AppConfig, records: Vec<PipelineRecord>) -> Self {
        let stream = MemorySignalStream::shared();
        let ledger = MemoryExecutionLedger::shared();
        let source = StaticPipelineSource::shared(records);
        let components = Components {
            pipeline_source: source.clone(),
            signal_stream: stream.clone(),
            execution_state: ledger.clone(),
            task_queue: ledger.clone(),
        };

        let app = Application::new(config);
        let shutdown = app.shutdown_token();
        let handle = tokio::spawn(app.run_with(components));

        Self {
            stream,
            ledger,
            source,
            shutdown,
            handle,
        }
    }

    /// Cancel and wait for the application to finish.
    pub async fn stop(self) -> LoopSummary {
        self.shutdown.cancel();
        self.join().await
    }

    /// Wait for the application to finish on its own.
    pub async fn join(self) -> LoopSummary {
        tokio::time::timeout(WAIT_LIMIT, self.handle)
            .await
            .expect("application did not stop in time")
            .expect("application task panicked")
            .expect("application returned an error")
    }
}

/// Config with fast timings and no HTTP server.
pub fn test_config(batch_size: usize, batch_timeout_ms: u64) -> AppConfig {
    let mut config = AppConfig::default();
    config.batch.batch_size = batch_size;
    config.batch.batch_timeout_ms = batch_timeout_ms;
    config.cache.refresh_interval_secs = 1;
    config.dispatch.failure_backoff_ms = 20;
    config.dispatch.busy_check_timeout_ms = 500;
    config.dispatch.enqueue_timeout_ms = 500;
    config.telemetry.http_enabled = false;
    config
}

pub fn pipeline(tickers: &[&str]) -> PipelineRecord {
    PipelineRecord::signal_triggered(
        PipelineId::random(),
        OwnerId::new(Uuid::new_v4()),
        tickers.iter().copied(),
    )
}

/// Signal payload with one entry per (ticker, confidence).
pub fn signal(signal_id: &str, signal_type: &str, tickers: &[(&str, f64)]) -> serde_json::Value {
    let tickers: Vec<_> = tickers
        .iter()
        .map(|(ticker, confidence)| {
            json!({"ticker": ticker, "signal": "bullish", "confidence": confidence})
        })
        .collect();
    json!({
        "signal_id": signal_id,
        "signal_type": signal_type,
        "source": "integration",
        "timestamp": "2024-03-14T15:30:00Z",
        "tickers": tickers,
        "metadata": {"timeframe": "1d"}
    })
}

/// Poll `condition` until it holds or the wait limit is hit.
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let reached = tokio::time::timeout(WAIT_LIMIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for: {what}");
}
