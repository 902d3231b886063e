//! Signal ingestion for the trigger dispatcher.
//!
//! Pulls raw records from the event stream, validates them into
//! `SignalEvent`s and groups them into bounded batches:
//!
//! ```text
//! SignalStream -> SignalIngestor (parse/validate) -> BatchAccumulator -> Batch
//! ```
//!
//! Malformed records are skipped but their stream positions ride along with
//! the next batch so they are committed with it.

pub mod accumulator;
pub mod error;
pub mod ingestor;
pub mod parser;
pub mod stream;

pub use accumulator::{Batch, BatchAccumulator, BatchConfig};
pub use error::{IngestError, IngestResult};
pub use ingestor::{Ingested, SignalIngestor};
pub use parser::{MalformedReason, SignalParser};
pub use stream::{MemorySignalStream, SignalStream, StreamRecord};
