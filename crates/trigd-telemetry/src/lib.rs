//! Prometheus metrics and structured logging for the trigger dispatcher.
//!
//! Provides observability for the dispatch path:
//! - Prometheus metrics for signals, batches, skips and dispatches
//! - Structured JSON logging with tracing
//! - `/metrics` and `/health` HTTP endpoints
//! - Periodic throughput / skip-rate summaries

pub mod error;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use server::{serve_metrics, HealthSnapshot};
pub use stats::{DispatchStats, DispatchStatsReporter};
