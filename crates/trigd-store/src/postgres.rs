//! Postgres adapters.

use std::collections::HashSet;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};
use trigd_cache::{CacheError, CacheResult, PipelineRecord, PipelineSource};
use trigd_core::{BoxFuture, OwnerId, PipelineId, SubscriptionFilter, TriggerMode};
use trigd_dispatch::{DispatchError, DispatchResult, ExecutionStateStore};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

/// Open a Postgres pool.
pub async fn connect_pool(config: &PoolConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.url)
        .await?;
    info!(
        max_connections = config.max_connections,
        "Connected to Postgres"
    );
    Ok(pool)
}

// ============================================================================
// PgPipelineSource
// ============================================================================

const LOAD_PIPELINES_SQL: &str = r#"
SELECT p.id,
       p.owner_id,
       p.is_active,
       p.trigger_mode,
       COALESCE(array_agg(st.ticker) FILTER (WHERE st.ticker IS NOT NULL), '{}') AS tickers,
       p.signal_subscriptions
FROM pipelines p
LEFT JOIN scanner_tickers st ON st.scanner_id = p.scanner_id
WHERE p.is_active AND p.trigger_mode = 'signal'
GROUP BY p.id
"#;

type PipelineRow = (Uuid, Uuid, bool, String, Vec<String>, Option<serde_json::Value>);

/// Active signal-triggered pipelines with their scanner tickers.
#[derive(Debug, Clone)]
pub struct PgPipelineSource {
    pool: PgPool,
}

impl PgPipelineSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self) -> StoreResult<Vec<PipelineRecord>> {
        let rows = sqlx::query_as::<_, PipelineRow>(LOAD_PIPELINES_SQL)
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match record_from_row(row) {
                Ok(record) => records.push(record),
                // Unreadable filters would otherwise widen to match-all.
                Err(e) => warn!(error = %e, "Skipping pipeline with unreadable filters"),
            }
        }
        Ok(records)
    }
}

impl PipelineSource for PgPipelineSource {
    fn load_pipelines(&self) -> BoxFuture<'_, CacheResult<Vec<PipelineRecord>>> {
        Box::pin(async move {
            self.load()
                .await
                .map_err(|e| CacheError::Source(e.to_string()))
        })
    }
}

/// Convert one joined row into a cache record.
fn record_from_row(row: PipelineRow) -> StoreResult<PipelineRecord> {
    let (id, owner_id, is_active, trigger_mode, tickers, subscriptions) = row;
    let pipeline_id = PipelineId::from(id);
    let filters = parse_filters(subscriptions).map_err(|e| StoreError::InvalidFilters {
        pipeline_id,
        reason: e.to_string(),
    })?;

    Ok(PipelineRecord {
        pipeline_id,
        owner_id: OwnerId::from(owner_id),
        is_active,
        trigger_mode: TriggerMode::parse(&trigger_mode),
        tickers,
        filters,
    })
}

/// `signal_subscriptions` is a JSON array of filter objects; a bare object
/// is read as a one-element array and NULL as no filters.
fn parse_filters(value: Option<serde_json::Value>) -> serde_json::Result<Vec<SubscriptionFilter>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(v @ serde_json::Value::Object(_)) => Ok(vec![serde_json::from_value(v)?]),
        Some(v) => serde_json::from_value(v),
    }
}

// ============================================================================
// PgExecutionStateStore
// ============================================================================

const BUSY_PIPELINES_SQL: &str = r#"
SELECT DISTINCT pipeline_id
FROM pipeline_executions
WHERE pipeline_id = ANY($1) AND status <> ALL($2)
"#;

/// Default terminal execution statuses.
pub const DEFAULT_TERMINAL_STATUSES: [&str; 3] = ["completed", "failed", "cancelled"];

/// Bulk busy check against `pipeline_executions`.
#[derive(Debug, Clone)]
pub struct PgExecutionStateStore {
    pool: PgPool,
    terminal_statuses: Vec<String>,
}

impl PgExecutionStateStore {
    pub fn new(pool: PgPool, terminal_statuses: Vec<String>) -> Self {
        Self {
            pool,
            terminal_statuses,
        }
    }

    async fn busy(&self, pipeline_ids: &[PipelineId]) -> StoreResult<HashSet<PipelineId>> {
        let ids: Vec<Uuid> = pipeline_ids.iter().map(|id| id.as_uuid()).collect();
        let busy = sqlx::query_scalar::<_, Uuid>(BUSY_PIPELINES_SQL)
            .bind(&ids)
            .bind(&self.terminal_statuses)
            .fetch_all(&self.pool)
            .await?;
        Ok(busy.into_iter().map(PipelineId::from).collect())
    }
}

impl ExecutionStateStore for PgExecutionStateStore {
    fn busy_pipelines<'a>(
        &'a self,
        pipeline_ids: &'a [PipelineId],
    ) -> BoxFuture<'a, DispatchResult<HashSet<PipelineId>>> {
        Box::pin(async move {
            self.busy(pipeline_ids)
                .await
                .map_err(|e| DispatchError::BusyCheck(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(subscriptions: Option<serde_json::Value>) -> PipelineRow {
        (
            Uuid::new_v4(),
            Uuid::new_v4(),
            true,
            "signal".to_string(),
            vec!["AAPL".to_string(), "msft".to_string()],
            subscriptions,
        )
    }

    #[test]
    fn test_record_from_row_with_filter_array() {
        let record = record_from_row(row(Some(json!([
            {"signal_type": "golden_cross", "min_confidence": 80},
            {"timeframe": "1h"}
        ]))))
        .unwrap();

        assert!(record.is_eligible());
        assert_eq!(record.tickers.len(), 2);
        assert_eq!(record.filters.len(), 2);
        assert_eq!(record.filters[0].min_confidence, Some(80.0));
        assert_eq!(record.filters[1].timeframe.as_deref(), Some("1h"));
    }

    #[test]
    fn test_null_or_missing_subscriptions_mean_no_filters() {
        assert!(record_from_row(row(None)).unwrap().filters.is_empty());
        assert!(record_from_row(row(Some(serde_json::Value::Null)))
            .unwrap()
            .filters
            .is_empty());
    }

    #[test]
    fn test_single_object_is_one_filter() {
        let record =
            record_from_row(row(Some(json!({"signal_type": "breakout"})))).unwrap();
        assert_eq!(record.filters.len(), 1);
        assert_eq!(record.filters[0].signal_type.as_deref(), Some("breakout"));
    }

    #[test]
    fn test_unreadable_filters_are_rejected() {
        let err = record_from_row(row(Some(json!("everything")))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilters { .. }));

        let err = record_from_row(row(Some(json!([{"min_confidence": "high"}])))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilters { .. }));
    }
}
