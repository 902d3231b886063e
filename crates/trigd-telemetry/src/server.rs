//! Metrics and health HTTP endpoints using axum.

use std::net::SocketAddr;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::TelemetryResult;
use crate::metrics::{CACHE_GENERATION, CACHE_INSTRUMENTS, CACHE_PIPELINES};

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// "ok" once a cache generation is live, "starting" before.
    pub status: &'static str,
    pub cache_generation: i64,
    pub cache_pipelines: i64,
    pub cache_instruments: i64,
}

impl HealthSnapshot {
    pub fn current() -> Self {
        let cache_generation = CACHE_GENERATION.get();
        Self {
            status: if cache_generation > 0 { "ok" } else { "starting" },
            cache_generation,
            cache_pipelines: CACHE_PIPELINES.get(),
            cache_instruments: CACHE_INSTRUMENTS.get(),
        }
    }
}

/// Create the axum router.
pub fn create_router() -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .route("/health", get(get_health))
}

/// Prometheus text exposition of the default registry.
async fn get_metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(?e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn get_health() -> Response {
    let snapshot = HealthSnapshot::current();
    let status = if snapshot.cache_generation > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(snapshot)).into_response()
}

/// Run the metrics HTTP server until `shutdown` is cancelled.
pub async fn serve_metrics(port: u16, shutdown: CancellationToken) -> TelemetryResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting metrics server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, create_router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Metrics server stopped");
    Ok(())
}
