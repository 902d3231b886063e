//! Run-request dispatch.
//!
//! Collapses a batch's surviving candidates to one per pipeline and enqueues
//! a [`DispatchDecision`] for each. Enqueues run one at a time, each bounded
//! by a timeout, and stop at the first failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use trigd_core::{BoxFuture, CandidatePair, DispatchDecision, PipelineId, SignalEvent};
use trigd_telemetry::Metrics;

use crate::error::{DispatchError, DispatchResult};

/// Durable queue consumed by the execution engine.
pub trait TaskQueue: Send + Sync {
    /// Enqueue one pipeline run request.
    fn enqueue<'a>(&'a self, decision: &'a DispatchDecision) -> BoxFuture<'a, DispatchResult<()>>;
}

/// One candidate per pipeline: highest confidence, earliest on ties.
///
/// Winners come back in batch order of the pair that won.
pub fn select_winners(candidates: Vec<CandidatePair>) -> Vec<CandidatePair> {
    let mut best: HashMap<PipelineId, usize> = HashMap::new();
    for (i, candidate) in candidates.iter().enumerate() {
        best.entry(candidate.pipeline_id)
            .and_modify(|current| {
                // Strictly greater keeps the earlier pair on ties.
                if candidate.confidence > candidates[*current].confidence {
                    *current = i;
                }
            })
            .or_insert(i);
    }

    let mut winners: Vec<usize> = best.into_values().collect();
    winners.sort_unstable();
    let mut candidates: Vec<Option<CandidatePair>> = candidates.into_iter().map(Some).collect();
    winners
        .into_iter()
        .filter_map(|i| candidates[i].take())
        .collect()
}

/// Enqueues run requests for a batch.
pub struct Dispatcher {
    queue: Arc<dyn TaskQueue>,
    enqueue_timeout: Duration,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>, enqueue_timeout: Duration) -> Self {
        Self {
            queue,
            enqueue_timeout,
        }
    }

    /// Enqueue one run request per winner.
    ///
    /// `events` is the batch the winners' `event_index` refers to. Returns
    /// the enqueued decisions, or the first failure; requests enqueued
    /// before a failure stay enqueued.
    pub async fn dispatch(
        &self,
        winners: &[CandidatePair],
        events: &[SignalEvent],
    ) -> DispatchResult<Vec<DispatchDecision>> {
        let mut enqueued = Vec::with_capacity(winners.len());

        for pair in winners {
            let Some(event) = events.get(pair.event_index) else {
                return Err(DispatchError::Enqueue {
                    pipeline_id: pair.pipeline_id,
                    reason: format!("no event at batch index {}", pair.event_index),
                });
            };
            let decision = DispatchDecision::from_candidate(pair, event);

            let result = tokio::time::timeout(self.enqueue_timeout, self.queue.enqueue(&decision))
                .await
                .map_err(|_| DispatchError::EnqueueTimeout {
                    pipeline_id: pair.pipeline_id,
                    timeout_ms: self.enqueue_timeout.as_millis() as u64,
                })
                .and_then(|r| r);

            if let Err(e) = result {
                warn!(
                    pipeline_id = %pair.pipeline_id,
                    signal_id = %pair.signal_id,
                    enqueued = enqueued.len(),
                    remaining = winners.len() - enqueued.len(),
                    error = %e,
                    "Enqueue failed, abandoning rest of batch"
                );
                return Err(e);
            }

            Metrics::dispatched(&decision.signal_type);
            info!(
                pipeline_id = %decision.pipeline_id,
                owner_id = %decision.owner_id,
                signal_id = %decision.signal_id,
                signal_type = %decision.signal_type,
                ticker = %decision.matched_ticker,
                direction = %decision.direction,
                confidence = decision.confidence,
                dispatch_id = %decision.dispatch_id,
                "Pipeline run enqueued"
            );
            enqueued.push(decision);
        }

        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryExecutionLedger;
    use chrono::Utc;
    use trigd_core::{Direction, OwnerId, TickerSignal};
    use uuid::Uuid;

    fn pair(pipeline_id: PipelineId, event_index: usize, ticker: &str, confidence: f64) -> CandidatePair {
        CandidatePair {
            pipeline_id,
            owner_id: OwnerId::new(Uuid::nil()),
            signal_id: format!("sig-{event_index}"),
            signal_type: "breakout".to_string(),
            matched_ticker: ticker.to_string(),
            direction: Direction::Bullish,
            confidence,
            event_index,
        }
    }

    fn event(i: usize) -> SignalEvent {
        SignalEvent {
            signal_id: format!("sig-{i}"),
            signal_type: "breakout".to_string(),
            source: "test".to_string(),
            timestamp: Utc::now(),
            tickers: vec![TickerSignal::new("AAPL", Direction::Bullish, 50.0)],
            metadata: Default::default(),
        }
    }

    #[test]
    fn test_select_winners_keeps_highest_confidence() {
        let p1 = PipelineId::random();
        let p2 = PipelineId::random();
        let winners = select_winners(vec![
            pair(p1, 0, "AAPL", 60.0),
            pair(p2, 0, "AAPL", 40.0),
            pair(p1, 1, "MSFT", 90.0),
            pair(p1, 2, "TSLA", 70.0),
        ]);

        assert_eq!(winners.len(), 2);
        // Ordered by the winning pair's position in the batch.
        assert_eq!(winners[0].pipeline_id, p2);
        assert_eq!(winners[1].pipeline_id, p1);
        assert_eq!(winners[1].matched_ticker, "MSFT");
        assert_eq!(winners[1].confidence, 90.0);
    }

    #[test]
    fn test_select_winners_tie_goes_to_earliest() {
        let p1 = PipelineId::random();
        let winners = select_winners(vec![
            pair(p1, 0, "AAPL", 80.0),
            pair(p1, 0, "MSFT", 80.0),
            pair(p1, 1, "TSLA", 80.0),
        ]);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].matched_ticker, "AAPL");
        assert_eq!(winners[0].event_index, 0);
    }

    #[tokio::test]
    async fn test_dispatch_enqueues_with_signal_metadata() {
        let ledger = MemoryExecutionLedger::shared();
        let dispatcher = Dispatcher::new(ledger.clone(), Duration::from_secs(1));
        let p1 = PipelineId::random();

        let mut events = vec![event(0)];
        events[0]
            .metadata
            .insert("timeframe".to_string(), serde_json::json!("1h"));

        let decisions = dispatcher
            .dispatch(&[pair(p1, 0, "AAPL", 77.0)], &events)
            .await
            .unwrap();

        assert_eq!(decisions.len(), 1);
        let enqueued = ledger.enqueued();
        assert_eq!(enqueued.len(), 1);
        assert_eq!(enqueued[0].pipeline_id, p1);
        assert_eq!(enqueued[0].confidence, 77.0);
        assert_eq!(enqueued[0].metadata["timeframe"], "1h");
        assert!(ledger.is_running(p1));
    }

    #[tokio::test]
    async fn test_dispatch_stops_at_first_failure() {
        let ledger = MemoryExecutionLedger::shared();
        ledger.fail_enqueue_after(1);
        let dispatcher = Dispatcher::new(ledger.clone(), Duration::from_secs(1));

        let winners = vec![
            pair(PipelineId::random(), 0, "AAPL", 90.0),
            pair(PipelineId::random(), 0, "AAPL", 80.0),
            pair(PipelineId::random(), 0, "AAPL", 70.0),
        ];
        let err = dispatcher.dispatch(&winners, &[event(0)]).await.unwrap_err();

        assert_eq!(err.stage(), "enqueue");
        assert_eq!(ledger.enqueued().len(), 1);
        assert_eq!(ledger.enqueue_attempts(), 2);
    }
}
