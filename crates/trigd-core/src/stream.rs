//! Event stream positions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Position of one record on the event stream (partition + offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamPosition {
    pub partition: i32,
    pub offset: i64,
}

impl StreamPosition {
    pub fn new(partition: i32, offset: i64) -> Self {
        Self { partition, offset }
    }

    /// Highest position per partition (what a commit acknowledges).
    pub fn latest_per_partition(positions: &[StreamPosition]) -> Vec<StreamPosition> {
        let mut latest: BTreeMap<i32, i64> = BTreeMap::new();
        for pos in positions {
            latest
                .entry(pos.partition)
                .and_modify(|o| *o = (*o).max(pos.offset))
                .or_insert(pos.offset);
        }
        latest
            .into_iter()
            .map(|(partition, offset)| Self { partition, offset })
            .collect()
    }

    /// Lowest position per partition (where a rewind must restart).
    pub fn earliest_per_partition(positions: &[StreamPosition]) -> Vec<StreamPosition> {
        let mut earliest: BTreeMap<i32, i64> = BTreeMap::new();
        for pos in positions {
            earliest
                .entry(pos.partition)
                .and_modify(|o| *o = (*o).min(pos.offset))
                .or_insert(pos.offset);
        }
        earliest
            .into_iter()
            .map(|(partition, offset)| Self { partition, offset })
            .collect()
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.partition, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions() -> Vec<StreamPosition> {
        vec![
            StreamPosition::new(1, 40),
            StreamPosition::new(0, 12),
            StreamPosition::new(1, 38),
            StreamPosition::new(0, 15),
            StreamPosition::new(1, 41),
        ]
    }

    #[test]
    fn test_latest_per_partition() {
        let latest = StreamPosition::latest_per_partition(&positions());
        assert_eq!(
            latest,
            vec![StreamPosition::new(0, 15), StreamPosition::new(1, 41)]
        );
    }

    #[test]
    fn test_earliest_per_partition() {
        let earliest = StreamPosition::earliest_per_partition(&positions());
        assert_eq!(
            earliest,
            vec![StreamPosition::new(0, 12), StreamPosition::new(1, 38)]
        );
    }

    #[test]
    fn test_empty_positions() {
        assert!(StreamPosition::latest_per_partition(&[]).is_empty());
        assert!(StreamPosition::earliest_per_partition(&[]).is_empty());
    }
}
