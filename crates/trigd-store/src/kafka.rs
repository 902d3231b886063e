//! Kafka adapters.
//!
//! The consumer runs with auto-commit disabled: offsets move only when a
//! batch reaches COMMITTED. Commits and seeks are blocking librdkafka calls
//! and run on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info};
use trigd_core::{BoxFuture, DispatchDecision, StreamPosition};
use trigd_dispatch::{DispatchError, DispatchResult, TaskQueue};
use trigd_ingest::{IngestError, IngestResult, SignalStream, StreamRecord};

use crate::error::StoreResult;

/// Upper bound on a partition seek.
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// KafkaSignalStream
// ============================================================================

/// Signal topic consumer settings.
#[derive(Debug, Clone)]
pub struct KafkaConsumerConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub session_timeout_ms: u64,
}

/// Signal topic consumer.
pub struct KafkaSignalStream {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaSignalStream {
    /// Create the consumer and subscribe to the signal topic.
    pub fn new(config: &KafkaConsumerConfig) -> StoreResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .create()?;
        consumer.subscribe(&[&config.topic])?;

        info!(
            topic = %config.topic,
            group_id = %config.group_id,
            "Subscribed to signal topic"
        );
        Ok(Self {
            consumer: Arc::new(consumer),
            topic: config.topic.clone(),
        })
    }
}

/// Commit list for the last consumed position per partition.
///
/// Kafka commits the next offset to read, hence `offset + 1`.
fn commit_list(topic: &str, positions: &[StreamPosition]) -> StoreResult<TopicPartitionList> {
    let mut list = TopicPartitionList::new();
    for pos in positions {
        list.add_partition_offset(topic, pos.partition, Offset::Offset(pos.offset + 1))?;
    }
    Ok(list)
}

impl SignalStream for KafkaSignalStream {
    fn next(&self) -> BoxFuture<'_, IngestResult<Option<StreamRecord>>> {
        Box::pin(async move {
            let message = self
                .consumer
                .recv()
                .await
                .map_err(|e| IngestError::Transport(e.to_string()))?;
            Ok(Some(StreamRecord {
                position: StreamPosition::new(message.partition(), message.offset()),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            }))
        })
    }

    fn commit<'a>(&'a self, positions: &'a [StreamPosition]) -> BoxFuture<'a, IngestResult<()>> {
        Box::pin(async move {
            let list =
                commit_list(&self.topic, positions).map_err(|e| IngestError::Commit(e.to_string()))?;
            let consumer = Arc::clone(&self.consumer);
            tokio::task::spawn_blocking(move || consumer.commit(&list, CommitMode::Sync))
                .await
                .map_err(|e| IngestError::Commit(e.to_string()))?
                .map_err(|e| IngestError::Commit(e.to_string()))?;
            debug!(?positions, "Offsets committed");
            Ok(())
        })
    }

    fn rewind<'a>(&'a self, positions: &'a [StreamPosition]) -> BoxFuture<'a, IngestResult<()>> {
        Box::pin(async move {
            for pos in positions.iter().copied() {
                let consumer = Arc::clone(&self.consumer);
                let topic = self.topic.clone();
                tokio::task::spawn_blocking(move || {
                    consumer.seek(&topic, pos.partition, Offset::Offset(pos.offset), SEEK_TIMEOUT)
                })
                .await
                .map_err(|e| IngestError::Rewind(e.to_string()))?
                .map_err(|e| IngestError::Rewind(e.to_string()))?;
            }
            info!(?positions, "Rewound signal stream");
            Ok(())
        })
    }
}

// ============================================================================
// KafkaTaskQueue
// ============================================================================

/// Run-request producer.
///
/// Messages are keyed by pipeline id so one pipeline's requests stay
/// ordered within a partition.
pub struct KafkaTaskQueue {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl KafkaTaskQueue {
    pub fn new(brokers: &str, topic: &str, send_timeout: Duration) -> StoreResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", send_timeout.as_millis().to_string())
            .set("enable.idempotence", "true")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
            send_timeout,
        })
    }
}

/// Message key and JSON payload for a run request.
fn encode_decision(decision: &DispatchDecision) -> StoreResult<(String, String)> {
    Ok((
        decision.pipeline_id.to_string(),
        serde_json::to_string(decision)?,
    ))
}

impl TaskQueue for KafkaTaskQueue {
    fn enqueue<'a>(&'a self, decision: &'a DispatchDecision) -> BoxFuture<'a, DispatchResult<()>> {
        Box::pin(async move {
            let (key, payload) = encode_decision(decision).map_err(|e| DispatchError::Enqueue {
                pipeline_id: decision.pipeline_id,
                reason: e.to_string(),
            })?;

            let (partition, offset) = self
                .producer
                .send(
                    FutureRecord::to(&self.topic).key(&key).payload(&payload),
                    Timeout::After(self.send_timeout),
                )
                .await
                .map_err(|(e, _)| DispatchError::Enqueue {
                    pipeline_id: decision.pipeline_id,
                    reason: e.to_string(),
                })?;

            debug!(
                pipeline_id = %decision.pipeline_id,
                partition,
                offset,
                "Run request delivered"
            );
            Ok(())
        })
    }
}
