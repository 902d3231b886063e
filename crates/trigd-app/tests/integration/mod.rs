//! Integration tests for trigd-app.
//!
//! These drive the full stream -> match -> busy check -> enqueue -> commit
//! path with in-memory collaborators:
//! - Duplicate dispatch suppression
//! - Failure and redelivery
//! - Flush triggers and shutdown
//! - Cache refresh while consuming

pub mod common;
