//! Event stream seam.
//!
//! [`SignalStream`] is the consumer side of the signal topic: pull the next
//! record, commit consumed positions, rewind to redeliver a failed batch.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use trigd_core::{BoxFuture, StreamPosition};

use crate::error::{IngestError, IngestResult};

/// One raw record pulled from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub position: StreamPosition,
    pub payload: Vec<u8>,
}

/// Consumer side of the signal event stream.
pub trait SignalStream: Send + Sync {
    /// Next record, waiting until one is available.
    ///
    /// `Ok(None)` means the stream has ended.
    fn next(&self) -> BoxFuture<'_, IngestResult<Option<StreamRecord>>>;

    /// Acknowledge everything up to and including each position.
    ///
    /// Positions are the last consumed record per partition.
    fn commit<'a>(&'a self, positions: &'a [StreamPosition]) -> BoxFuture<'a, IngestResult<()>>;

    /// Resume reading each partition from the given position.
    fn rewind<'a>(&'a self, positions: &'a [StreamPosition]) -> BoxFuture<'a, IngestResult<()>>;
}

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<Vec<u8>>,
    cursor: usize,
    closed: bool,
    committed: Option<i64>,
    commit_log: Vec<Vec<StreamPosition>>,
    rewinds: Vec<Vec<StreamPosition>>,
    pull_failures: VecDeque<String>,
    fail_commits: bool,
}

/// In-memory single-partition stream (partition 0, offset = index).
///
/// `next` waits for new records until [`MemorySignalStream::close`] is
/// called, after which it drains the remainder and returns `Ok(None)`.
#[derive(Debug, Default)]
pub struct MemorySignalStream {
    state: Mutex<MemoryState>,
    notify: Notify,
}

impl MemorySignalStream {
    pub const PARTITION: i32 = 0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Append a raw payload and return its position.
    pub fn push(&self, payload: impl Into<Vec<u8>>) -> StreamPosition {
        let offset = {
            let mut state = self.state.lock();
            state.records.push(payload.into());
            state.records.len() - 1
        };
        self.notify.notify_waiters();
        StreamPosition::new(Self::PARTITION, offset as i64)
    }

    /// Append a JSON value.
    pub fn push_json(&self, value: &serde_json::Value) -> StreamPosition {
        self.push(value.to_string())
    }

    /// End the stream once the remaining records are read.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Fail the next pull with a transport error.
    pub fn fail_next_pull(&self, message: impl Into<String>) {
        self.state.lock().pull_failures.push_back(message.into());
    }

    /// Make commits fail (or succeed again).
    pub fn set_fail_commits(&self, fail: bool) {
        self.state.lock().fail_commits = fail;
    }

    /// Highest committed offset.
    pub fn committed_offset(&self) -> Option<i64> {
        self.state.lock().committed
    }

    /// Every successful commit call, in order.
    pub fn commit_log(&self) -> Vec<Vec<StreamPosition>> {
        self.state.lock().commit_log.clone()
    }

    /// Every rewind call, in order.
    pub fn rewinds(&self) -> Vec<Vec<StreamPosition>> {
        self.state.lock().rewinds.clone()
    }

    /// Records not yet read.
    pub fn pending(&self) -> usize {
        let state = self.state.lock();
        state.records.len().saturating_sub(state.cursor)
    }
}

impl SignalStream for MemorySignalStream {
    fn next(&self) -> BoxFuture<'_, IngestResult<Option<StreamRecord>>> {
        Box::pin(async move {
            loop {
                let notified = self.notify.notified();
                {
                    let mut state = self.state.lock();
                    if let Some(message) = state.pull_failures.pop_front() {
                        return Err(IngestError::Transport(message));
                    }
                    if state.cursor < state.records.len() {
                        let offset = state.cursor;
                        state.cursor += 1;
                        return Ok(Some(StreamRecord {
                            position: StreamPosition::new(Self::PARTITION, offset as i64),
                            payload: state.records[offset].clone(),
                        }));
                    }
                    if state.closed {
                        return Ok(None);
                    }
                }
                notified.await;
            }
        })
    }

    fn commit<'a>(&'a self, positions: &'a [StreamPosition]) -> BoxFuture<'a, IngestResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if state.fail_commits {
                return Err(IngestError::Commit("memory stream set to fail commits".to_string()));
            }
            for pos in positions.iter().filter(|p| p.partition == Self::PARTITION) {
                state.committed = Some(state.committed.map_or(pos.offset, |c| c.max(pos.offset)));
            }
            state.commit_log.push(positions.to_vec());
            Ok(())
        })
    }

    fn rewind<'a>(&'a self, positions: &'a [StreamPosition]) -> BoxFuture<'a, IngestResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if let Some(pos) = positions.iter().find(|p| p.partition == Self::PARTITION) {
                if pos.offset < 0 || pos.offset as usize > state.records.len() {
                    return Err(IngestError::Rewind(format!("offset {pos} out of range")));
                }
                state.cursor = pos.offset as usize;
            }
            state.rewinds.push(positions.to_vec());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_reads_in_order_then_ends_after_close() {
        let stream = MemorySignalStream::new();
        stream.push("a");
        stream.push("b");
        stream.close();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.position, StreamPosition::new(0, 0));
        assert_eq!(first.payload, b"a");
        assert_eq!(stream.next().await.unwrap().unwrap().payload, b"b");
        assert!(stream.next().await.unwrap().is_none());
    }

    #[test]
    fn test_next_waits_for_push() {
        let stream = MemorySignalStream::new();
        let mut pull = task::spawn(stream.next());
        assert_pending!(pull.poll());

        stream.push("late");
        assert!(pull.is_woken());
        let record = assert_ready!(pull.poll()).unwrap().unwrap();
        assert_eq!(record.payload, b"late");
    }

    #[tokio::test]
    async fn test_rewind_redelivers() {
        let stream = MemorySignalStream::new();
        for p in ["a", "b", "c"] {
            stream.push(p);
        }
        stream.close();
        for _ in 0..3 {
            stream.next().await.unwrap();
        }

        stream.rewind(&[StreamPosition::new(0, 1)]).await.unwrap();
        assert_eq!(stream.pending(), 2);
        assert_eq!(stream.next().await.unwrap().unwrap().payload, b"b");
        assert_eq!(stream.rewinds().len(), 1);

        assert!(stream.rewind(&[StreamPosition::new(0, 9)]).await.is_err());
    }

    #[tokio::test]
    async fn test_commit_tracks_highest_offset_and_failures() {
        let stream = MemorySignalStream::new();
        stream.commit(&[StreamPosition::new(0, 4)]).await.unwrap();
        stream.commit(&[StreamPosition::new(0, 2)]).await.unwrap();
        assert_eq!(stream.committed_offset(), Some(4));
        assert_eq!(stream.commit_log().len(), 2);

        stream.set_fail_commits(true);
        assert!(matches!(
            stream.commit(&[StreamPosition::new(0, 9)]).await,
            Err(IngestError::Commit(_))
        ));
        assert_eq!(stream.committed_offset(), Some(4));
    }

    #[tokio::test]
    async fn test_injected_pull_failure() {
        let stream = MemorySignalStream::new();
        stream.push("a");
        stream.fail_next_pull("broker down");
        assert!(matches!(stream.next().await, Err(IngestError::Transport(_))));
        assert!(stream.next().await.unwrap().is_some());
    }
}
