//! Signal payload parsing and validation.

use std::collections::HashSet;

use thiserror::Error;
use trigd_core::{normalize_ticker, SignalEvent};

/// Lowest accepted ticker confidence.
pub const MIN_CONFIDENCE: f64 = 0.0;
/// Highest accepted ticker confidence.
pub const MAX_CONFIDENCE: f64 = 100.0;

/// Why a record was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedReason {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("missing signal_id")]
    MissingSignalId,

    #[error("missing signal_type")]
    MissingSignalType,

    #[error("unknown signal_type {0:?}")]
    UnknownSignalType(String),

    #[error("no tickers")]
    EmptyTickers,

    #[error("blank ticker at index {0}")]
    BlankTicker(usize),

    #[error("confidence {value} out of range for {ticker}")]
    InvalidConfidence { ticker: String, value: f64 },
}

impl MalformedReason {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::MissingSignalId => "signal_id",
            Self::MissingSignalType => "signal_type",
            Self::UnknownSignalType(_) => "unknown_signal_type",
            Self::EmptyTickers => "empty_tickers",
            Self::BlankTicker(_) => "blank_ticker",
            Self::InvalidConfidence { .. } => "confidence",
        }
    }
}

/// Parses raw stream payloads into validated [`SignalEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct SignalParser {
    /// When set, signal types outside this set are rejected.
    known_signal_types: Option<HashSet<String>>,
}

impl SignalParser {
    /// Parser accepting any non-empty signal type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict accepted signal types. An empty list means no restriction.
    #[must_use]
    pub fn with_known_signal_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let types: HashSet<String> = types.into_iter().map(Into::into).collect();
        self.known_signal_types = if types.is_empty() { None } else { Some(types) };
        self
    }

    /// Decode and validate one payload. Tickers come back normalized.
    pub fn parse(&self, payload: &[u8]) -> Result<SignalEvent, MalformedReason> {
        let mut event: SignalEvent =
            serde_json::from_slice(payload).map_err(|e| MalformedReason::Json(e.to_string()))?;
        self.validate(&mut event)?;
        Ok(event)
    }

    fn validate(&self, event: &mut SignalEvent) -> Result<(), MalformedReason> {
        if event.signal_id.trim().is_empty() {
            return Err(MalformedReason::MissingSignalId);
        }
        if event.signal_type.trim().is_empty() {
            return Err(MalformedReason::MissingSignalType);
        }
        if let Some(known) = &self.known_signal_types {
            if !known.contains(&event.signal_type) {
                return Err(MalformedReason::UnknownSignalType(event.signal_type.clone()));
            }
        }
        if event.tickers.is_empty() {
            return Err(MalformedReason::EmptyTickers);
        }

        for (i, ticker) in event.tickers.iter_mut().enumerate() {
            ticker.ticker = normalize_ticker(&ticker.ticker).ok_or(MalformedReason::BlankTicker(i))?;
            let c = ticker.confidence;
            if !c.is_finite() || !(MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&c) {
                return Err(MalformedReason::InvalidConfidence {
                    ticker: ticker.ticker.clone(),
                    value: c,
                });
            }
        }
        Ok(())
    }
}
