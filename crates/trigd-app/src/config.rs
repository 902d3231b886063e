//! Application configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use trigd_cache::RefresherConfig;
use trigd_dispatch::DispatchLoopConfig;
use trigd_ingest::BatchConfig;
use trigd_store::{KafkaConsumerConfig, PoolConfig};

use crate::error::{AppError, AppResult};

/// Path used when neither `--config` nor `TRIGD_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Overrides `database.url`.
pub const ENV_DATABASE_URL: &str = "TRIGD_DATABASE_URL";
/// Overrides `stream.brokers`.
pub const ENV_KAFKA_BROKERS: &str = "TRIGD_KAFKA_BROKERS";

// ============================================================================
// Sections
// ============================================================================

/// Signal topic consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Kafka bootstrap servers. Also used by the task queue producer.
    #[serde(default = "default_brokers")]
    pub brokers: String,
    #[serde(default = "default_signal_topic")]
    pub topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_signal_topic() -> String {
    "market-signals".to_string()
}

fn default_group_id() -> String {
    "trigger-dispatcher".to_string()
}

fn default_session_timeout_ms() -> u64 {
    10_000
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_signal_topic(),
            group_id: default_group_id(),
            session_timeout_ms: default_session_timeout_ms(),
        }
    }
}

/// Pipeline run-request queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_topic")]
    pub topic: String,
    /// Producer delivery timeout (ms).
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_queue_topic() -> String {
    "pipeline-runs".to_string()
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: default_queue_topic(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

/// Relational store holding pipelines and executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Execution statuses that count as finished for the busy check.
    #[serde(default = "default_terminal_statuses")]
    pub terminal_statuses: Vec<String>,
}

fn default_database_url() -> String {
    "postgres://localhost/pipelines".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_ms() -> u64 {
    3_000
}

fn default_terminal_statuses() -> Vec<String> {
    trigd_store::postgres::DEFAULT_TERMINAL_STATUSES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            terminal_statuses: default_terminal_statuses(),
        }
    }
}

/// Batch flush thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Default: 20.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Default: 500ms.
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

fn default_batch_size() -> usize {
    20
}

fn default_batch_timeout_ms() -> u64 {
    500
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

/// Pipeline cache refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    /// Default: 30s.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
}

fn default_refresh_interval_secs() -> u64 {
    30
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            load_timeout_ms: default_load_timeout_ms(),
        }
    }
}

/// Busy check, enqueue and failure handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSection {
    #[serde(default = "default_busy_check_timeout_ms")]
    pub busy_check_timeout_ms: u64,
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    /// Pause after a failed batch or stream error.
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
}

fn default_busy_check_timeout_ms() -> u64 {
    2_000
}

fn default_enqueue_timeout_ms() -> u64 {
    5_000
}

fn default_failure_backoff_ms() -> u64 {
    1_000
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            busy_check_timeout_ms: default_busy_check_timeout_ms(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
        }
    }
}

/// Signal validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSection {
    /// Accepted signal types. Empty accepts any.
    #[serde(default)]
    pub known_signal_types: Vec<String>,
}

/// Metrics endpoint and periodic summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySection {
    #[serde(default = "default_http_enabled")]
    pub http_enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Default: 300s.
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_http_enabled() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9100
}

fn default_stats_interval_secs() -> u64 {
    300
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            http_enabled: default_http_enabled(),
            metrics_port: default_metrics_port(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub batch: BatchSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub dispatch: DispatchSection,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load, apply environment overrides and validate.
    ///
    /// A missing file at the default path falls back to defaults; a missing
    /// file anywhere else is an error.
    pub fn load(path: &str) -> AppResult<Self> {
        let mut config = if path == DEFAULT_CONFIG_PATH && !Path::new(path).exists() {
            warn!(path, "Config file not found, using defaults");
            Self::default()
        } else {
            Self::from_file(path)?
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `TRIGD_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.is_empty()) {
            self.database.url = url;
        }
        if let Some(brokers) = lookup(ENV_KAFKA_BROKERS).filter(|v| !v.is_empty()) {
            self.stream.brokers = brokers;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.batch.batch_size == 0 {
            return Err(AppError::Config("batch.batch_size must be > 0".to_string()));
        }
        if self.batch.batch_timeout_ms == 0 {
            return Err(AppError::Config("batch.batch_timeout_ms must be > 0".to_string()));
        }
        if self.cache.refresh_interval_secs == 0 {
            return Err(AppError::Config(
                "cache.refresh_interval_secs must be > 0".to_string(),
            ));
        }
        if self.stream.topic.trim().is_empty() {
            return Err(AppError::Config("stream.topic must not be empty".to_string()));
        }
        if self.queue.topic.trim().is_empty() {
            return Err(AppError::Config("queue.topic must not be empty".to_string()));
        }
        if self.database.terminal_statuses.is_empty() {
            return Err(AppError::Config(
                "database.terminal_statuses must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch.batch_size,
            batch_timeout: Duration::from_millis(self.batch.batch_timeout_ms),
        }
    }

    pub fn refresher_config(&self) -> RefresherConfig {
        RefresherConfig {
            interval: Duration::from_secs(self.cache.refresh_interval_secs),
            load_timeout: Duration::from_millis(self.cache.load_timeout_ms),
        }
    }

    pub fn loop_config(&self) -> DispatchLoopConfig {
        DispatchLoopConfig {
            batch: self.batch_config(),
            failure_backoff: Duration::from_millis(self.dispatch.failure_backoff_ms),
        }
    }

    pub fn busy_check_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.busy_check_timeout_ms)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.enqueue_timeout_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry.stats_interval_secs.max(1))
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            acquire_timeout: Duration::from_millis(self.database.acquire_timeout_ms),
        }
    }

    pub fn consumer_config(&self) -> KafkaConsumerConfig {
        KafkaConsumerConfig {
            brokers: self.stream.brokers.clone(),
            topic: self.stream.topic.clone(),
            group_id: self.stream.group_id.clone(),
            session_timeout_ms: self.stream.session_timeout_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.batch.batch_size, 20);
        assert_eq!(config.batch.batch_timeout_ms, 500);
        assert_eq!(config.cache.refresh_interval_secs, 30);
        assert_eq!(
            config.database.terminal_statuses,
            vec!["completed", "failed", "cancelled"]
        );
        assert!(config.ingest.known_signal_types.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [batch]
            batch_size = 50

            [ingest]
            known_signal_types = ["golden_cross", "death_cross"]
            "#,
        )
        .unwrap();

        assert_eq!(config.batch.batch_size, 50);
        assert_eq!(config.batch.batch_timeout_ms, 500);
        assert_eq!(config.ingest.known_signal_types.len(), 2);
        assert_eq!(config.stream.topic, "market-signals");
        assert_eq!(config.batch_config().batch_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = AppConfig::default();
        config.batch.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.batch.batch_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cache.refresh_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.stream.topic = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            ENV_DATABASE_URL => Some("postgres://db/prod".to_string()),
            ENV_KAFKA_BROKERS => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.database.url, "postgres://db/prod");
        // Empty values are ignored.
        assert_eq!(config.stream.brokers, "localhost:9092");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[batch]\nbatch_size = \"many\"").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_config_serialization() {
        let toml_str = toml::to_string(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("batch_size"));
        assert!(toml_str.contains("terminal_statuses"));
    }
}
