//! Pipeline cache for the trigger dispatcher.
//!
//! Maintains an in-memory index from ticker to the active signal-triggered
//! pipelines tracking it. Each refresh builds a complete, immutable
//! [`CacheGeneration`] and swaps it in behind a single reference, so readers
//! always see one whole generation.

pub mod cache;
pub mod error;
pub mod generation;
pub mod refresher;
pub mod source;

pub use cache::PipelineCache;
pub use error::{CacheError, CacheResult};
pub use generation::CacheGeneration;
pub use refresher::{CacheRefresher, RefresherConfig};
pub use source::{PipelineRecord, PipelineSource, StaticPipelineSource};
