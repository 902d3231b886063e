//! Identifiers for pipelines and their owners.
//!
//! Both are UUIDs in the relational store; the newtypes keep them from
//! being swapped by accident at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;

/// Pipeline identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(Uuid);

impl PipelineId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Random ID (tests and local fixtures).
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for PipelineId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for PipelineId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::InvalidId(format!("pipeline id {s:?}: {e}")))
    }
}

/// Owner (user) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for OwnerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_id_unique() {
        assert_ne!(PipelineId::random(), PipelineId::random());
    }

    #[test]
    fn test_pipeline_id_parse() {
        let raw = "6f1c2a8e-4b1d-4c8e-9a57-0d3c1f2e4b5a";
        let id: PipelineId = raw.parse().unwrap();
        assert_eq!(id.to_string(), raw);

        let err = "not-a-uuid".parse::<PipelineId>();
        assert!(matches!(err, Err(CoreError::InvalidId(_))));
    }

    #[test]
    fn test_pipeline_id_serializes_as_plain_string() {
        let id = PipelineId::random();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
    }
}
