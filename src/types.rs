//! Core types for quiver

use serde::{Deserialize, Serialize};

/// Identifier assigned to a vector by the caller at build time.
pub type VectorId = i64;

/// Identifier of a partition (inverted list).
pub type PartitionId = i64;

/// Sentinel identifier padding unfilled result ranks.
pub const NO_ID: VectorId = -1;

/// Sentinel partition id denoting an empty assignment slot.
pub const NO_PARTITION: PartitionId = -1;

/// Distance metric for vector search, fixed at coordinator construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Squared Euclidean distance; smaller is better.
    L2,
    /// Dot product; larger is better.
    InnerProduct,
}

impl DistanceMetric {
    /// Distance value padding unfilled result ranks.
    pub fn sentinel(self) -> f32 {
        match self {
            DistanceMetric::L2 => f32::INFINITY,
            DistanceMetric::InnerProduct => f32::NEG_INFINITY,
        }
    }

    /// Map a raw distance onto an ascending sort key, so that a smaller key
    /// always means a better candidate regardless of metric.
    pub(crate) fn sort_key(self, distance: f32) -> f32 {
        match self {
            DistanceMetric::L2 => distance,
            DistanceMetric::InnerProduct => -distance,
        }
    }
}

/// Nanosecond timing breakdown of a single `search` call.
///
/// All fields are cumulative within the call. `parent` holds the time spent
/// inside the parent centroid index when partition selection ran.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingInfo {
    pub total_ns: u64,
    pub job_enqueue_ns: u64,
    pub job_wait_ns: u64,
    pub buffer_init_ns: u64,
    pub result_aggregate_ns: u64,
    pub boundary_distance_ns: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<TimingInfo>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_orders_both_metrics_ascending() {
        // L2: 1.0 beats 2.0; IP: 2.0 beats 1.0.
        assert!(DistanceMetric::L2.sort_key(1.0) < DistanceMetric::L2.sort_key(2.0));
        assert!(
            DistanceMetric::InnerProduct.sort_key(2.0) < DistanceMetric::InnerProduct.sort_key(1.0)
        );
    }

    #[test]
    fn sentinels_match_metric_direction() {
        assert_eq!(DistanceMetric::L2.sentinel(), f32::INFINITY);
        assert_eq!(DistanceMetric::InnerProduct.sentinel(), f32::NEG_INFINITY);
    }
}
