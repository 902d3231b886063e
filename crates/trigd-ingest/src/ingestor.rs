//! Pulls records from the stream and validates them.

use std::sync::Arc;

use tracing::{debug, warn};
use trigd_core::{SignalEvent, StreamPosition};
use trigd_telemetry::Metrics;

use crate::error::IngestResult;
use crate::parser::{MalformedReason, SignalParser};
use crate::stream::SignalStream;

/// Outcome of pulling one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    /// A valid signal and where it sits on the stream.
    Signal {
        event: SignalEvent,
        position: StreamPosition,
    },
    /// A malformed record that was dropped. Its position still needs
    /// committing.
    Skipped {
        position: StreamPosition,
        reason: MalformedReason,
    },
}

impl Ingested {
    pub fn position(&self) -> StreamPosition {
        match self {
            Self::Signal { position, .. } | Self::Skipped { position, .. } => *position,
        }
    }
}

/// Stream consumer front end.
pub struct SignalIngestor {
    stream: Arc<dyn SignalStream>,
    parser: SignalParser,
}

impl SignalIngestor {
    pub fn new(stream: Arc<dyn SignalStream>, parser: SignalParser) -> Self {
        Self { stream, parser }
    }

    /// The underlying stream, for commits and rewinds.
    pub fn stream(&self) -> &Arc<dyn SignalStream> {
        &self.stream
    }

    /// Pull and validate the next record.
    ///
    /// `Ok(None)` when the stream has ended. Transport errors are returned
    /// as-is; malformed payloads are not errors.
    pub async fn next(&self) -> IngestResult<Option<Ingested>> {
        let Some(record) = self.stream.next().await? else {
            return Ok(None);
        };
        let position = record.position;

        match self.parser.parse(&record.payload) {
            Ok(event) => {
                Metrics::signal_received(&event.source);
                debug!(
                    signal_id = %event.signal_id,
                    signal_type = %event.signal_type,
                    tickers = event.tickers.len(),
                    %position,
                    "Signal received"
                );
                Ok(Some(Ingested::Signal { event, position }))
            }
            Err(reason) => {
                Metrics::signal_malformed(reason.as_str());
                warn!(%position, %reason, "Malformed signal skipped");
                Ok(Some(Ingested::Skipped { position, reason }))
            }
        }
    }
}
