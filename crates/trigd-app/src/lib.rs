//! Signal trigger dispatcher.
//!
//! Wires the dispatch path together:
//! - Pipeline cache with periodic refresh from Postgres
//! - Kafka signal consumer feeding the batch loop
//! - Bulk busy check and run-request producer
//! - Metrics endpoint and periodic statistics summary

pub mod app;
pub mod config;
pub mod error;

pub use app::{Application, Components};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
