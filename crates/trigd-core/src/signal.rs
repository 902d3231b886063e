//! Inbound market signal types.
//!
//! A `SignalEvent` is published by an upstream analyzer and may be
//! redelivered by the stream, so `signal_id` is the only stable identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata key carrying the chart timeframe a signal was detected on.
pub const TIMEFRAME_KEY: &str = "timeframe";

/// Directional bias asserted for a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[serde(alias = "buy")]
    Bullish,
    #[serde(alias = "sell")]
    Bearish,
    #[serde(alias = "hold")]
    Neutral,
    /// Anything the producer sends that we do not recognise.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Per-ticker part of a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSignal {
    /// Instrument symbol as sent by the producer.
    pub ticker: String,
    /// Directional bias (`signal` on the wire).
    #[serde(rename = "signal")]
    pub direction: Direction,
    /// Confidence in [0, 100].
    pub confidence: f64,
}

impl TickerSignal {
    pub fn new(ticker: impl Into<String>, direction: Direction, confidence: f64) -> Self {
        Self {
            ticker: ticker.into(),
            direction,
            confidence,
        }
    }
}

/// A market signal event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    /// Producer-assigned unique ID.
    pub signal_id: String,
    /// Signal category, e.g. "golden_cross".
    pub signal_type: String,
    /// Producing analyzer.
    pub source: String,
    /// Detection time.
    pub timestamp: DateTime<Utc>,
    /// Tickers the signal applies to, in producer order.
    pub tickers: Vec<TickerSignal>,
    /// Opaque producer metadata, forwarded to dispatched runs.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SignalEvent {
    /// Timeframe from metadata, if the producer supplied one as a string.
    pub fn timeframe(&self) -> Option<&str> {
        self.metadata.get(TIMEFRAME_KEY).and_then(|v| v.as_str())
    }
}

/// Canonical form of a ticker symbol used as the cache key.
///
/// Returns `None` for symbols that are empty after trimming.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_uppercase())
    }
}
