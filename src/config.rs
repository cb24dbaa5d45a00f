//! Coordinator configuration

use serde::{Deserialize, Serialize};

const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_OVERFETCH_FACTOR: usize = 4;

/// Tunables for a [`QueryCoordinator`](crate::query::QueryCoordinator).
///
/// The coordinator is constructed programmatically; there is no file or
/// environment loading at this level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Number of long-lived scan workers. Zero means every scan runs inline
    /// on the calling thread.
    pub num_workers: usize,
    /// Bound on the scan job queue. Enqueueing blocks once the queue is full.
    pub queue_capacity: usize,
    /// Multiplier applied to `k` when post-filtering, so that enough
    /// candidates survive the predicate to fill the final result.
    pub overfetch_factor: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
        }
    }
}

impl CoordinatorConfig {
    /// Configuration with `num_workers` workers and defaults elsewhere.
    pub fn with_workers(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Self::default()
        }
    }
}
