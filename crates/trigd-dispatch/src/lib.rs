//! Batch matching and dispatch for the trigger dispatcher.
//!
//! Each flushed batch goes through:
//!
//! 1. [`MatchEngine`]: events x cached pipelines -> candidate pairs
//! 2. [`IdempotencyGate`]: one bulk busy check, running pipelines dropped
//! 3. [`Dispatcher`]: one run request per pipeline, highest confidence wins
//! 4. offset commit, or rewind on failure
//!
//! [`BatchProcessor`] drives that state machine for one batch and
//! [`DispatchLoop`] feeds it from the signal stream.

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod gate;
pub mod matcher;
pub mod memory;
pub mod processor;

pub use dispatcher::{select_winners, Dispatcher, TaskQueue};
pub use engine::{DispatchLoop, DispatchLoopConfig, LoopSummary};
pub use error::{DispatchError, DispatchResult};
pub use gate::{ExecutionStateStore, GateOutcome, IdempotencyGate};
pub use matcher::{entry_matches, filter_matches, MatchEngine, MatchResult};
pub use memory::MemoryExecutionLedger;
pub use processor::{BatchOutcome, BatchProcessor};
