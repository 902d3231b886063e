//! Core domain types for the signal trigger dispatcher.
//!
//! This crate provides the types shared by every stage of the dispatch path:
//! - `SignalEvent`, `TickerSignal`: inbound market signals
//! - `StreamPosition`: where a record sits on the event stream
//! - `PipelineCacheEntry`, `SubscriptionFilter`: what a pipeline listens for
//! - `CandidatePair`, `DispatchDecision`: match output and queue payload
//! - `BatchState`, `FlushTrigger`: per-batch lifecycle

pub mod dispatch;
pub mod error;
pub mod ids;
pub mod pipeline;
pub mod signal;
pub mod stream;

use std::pin::Pin;

pub use dispatch::{BatchState, CandidatePair, DispatchDecision, FlushTrigger};
pub use error::{CoreError, Result};
pub use ids::{OwnerId, PipelineId};
pub use pipeline::{FilterCriterion, PipelineCacheEntry, SubscriptionFilter, TriggerMode};
pub use signal::{normalize_ticker, Direction, SignalEvent, TickerSignal};
pub use stream::StreamPosition;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
