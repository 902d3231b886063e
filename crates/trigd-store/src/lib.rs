//! Production adapters for the trigger dispatcher.
//!
//! - [`PgPipelineSource`]: pipeline cache source (Postgres)
//! - [`PgExecutionStateStore`]: bulk busy check (Postgres)
//! - [`KafkaSignalStream`]: signal topic consumer with manual commits
//! - [`KafkaTaskQueue`]: run-request producer

pub mod error;
pub mod kafka;
pub mod postgres;

pub use error::{StoreError, StoreResult};
pub use kafka::{KafkaConsumerConfig, KafkaSignalStream, KafkaTaskQueue};
pub use postgres::{connect_pool, PgExecutionStateStore, PgPipelineSource, PoolConfig};
