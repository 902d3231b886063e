//! Pipeline subscription types held in the pipeline cache.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::ids::{OwnerId, PipelineId};

/// How a pipeline is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    Manual,
    Scheduled,
    Signal,
    #[serde(other)]
    Other,
}

impl TriggerMode {
    /// Parse the store's textual trigger mode (case-insensitive).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Self::Manual,
            "scheduled" | "schedule" | "periodic" => Self::Scheduled,
            "signal" => Self::Signal,
            _ => Self::Other,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, Self::Signal)
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Signal => write!(f, "signal"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One independently optional dimension of a subscription filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCriterion<'a> {
    /// Signal category must equal this value.
    SignalType(&'a str),
    /// Ticker confidence must be at least this value.
    MinConfidence(f64),
    /// Signal timeframe must equal this value.
    Timeframe(&'a str),
}

/// A pipeline's subscription filter as stored (JSON object).
///
/// Dimensions are ANDed within one filter; a pipeline's filters are ORed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

impl SubscriptionFilter {
    pub fn for_signal_type(signal_type: impl Into<String>) -> Self {
        Self {
            signal_type: Some(signal_type.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = Some(min_confidence);
        self
    }

    #[must_use]
    pub fn with_timeframe(mut self, timeframe: impl Into<String>) -> Self {
        self.timeframe = Some(timeframe.into());
        self
    }

    /// The dimensions this filter actually constrains.
    pub fn criteria(&self) -> impl Iterator<Item = FilterCriterion<'_>> {
        let signal_type = self.signal_type.as_deref().map(FilterCriterion::SignalType);
        let confidence = self.min_confidence.map(FilterCriterion::MinConfidence);
        let timeframe = self.timeframe.as_deref().map(FilterCriterion::Timeframe);
        signal_type.into_iter().chain(confidence).chain(timeframe)
    }
}

/// One active signal-triggered pipeline in a cache generation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineCacheEntry {
    pub pipeline_id: PipelineId,
    pub owner_id: OwnerId,
    /// Normalized tickers tracked by the pipeline's scanner.
    pub instruments: HashSet<String>,
    /// Empty means any signal on a tracked instrument matches.
    pub filters: Vec<SubscriptionFilter>,
}

impl PipelineCacheEntry {
    pub fn tracks(&self, ticker: &str) -> bool {
        self.instruments.contains(ticker)
    }

    pub fn is_unfiltered(&self) -> bool {
        self.filters.is_empty()
    }
}
