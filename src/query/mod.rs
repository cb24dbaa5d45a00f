//! Query dispatch, parameters, and results

use serde::{Deserialize, Serialize};

use crate::attrs::{AttributeValue, PredicateOp};
use crate::types::{TimingInfo, VectorId};

mod coordinator;
pub(crate) mod scan;
pub mod topk;
pub(crate) mod worker;

pub use coordinator::QueryCoordinator;

/// Where the attribute predicate runs relative to distance computation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterStrategy {
    /// Evaluate once per search and skip rejected rows before scanning.
    Pre,
    /// Scan an oversized top-k first, then drop rejected candidates.
    Post,
}

/// Attribute predicate `column <op> value` attached to a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub column: String,
    pub op: PredicateOp,
    pub value: AttributeValue,
    pub strategy: FilterStrategy,
}

/// Per-search configuration.
///
/// The distance metric is fixed at coordinator construction and cannot be
/// overridden here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Number of neighbors per query. Required and positive.
    pub k: usize,
    /// Partitions to inspect per query (IVF only). Unset or zero falls back
    /// to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nprobe: Option<usize>,
    /// Vectorize distance computation across queries sharing a partition.
    #[serde(default = "default_batched_scan")]
    pub batched_scan: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<AttributeFilter>,
}

fn default_batched_scan() -> bool {
    true
}

impl SearchParams {
    /// Parameters requesting `k` neighbors with defaults elsewhere.
    pub fn new(k: usize) -> Self {
        Self {
            k,
            nprobe: None,
            batched_scan: true,
            filter: None,
        }
    }
}

/// Ranked output of one `search` call.
///
/// `ids` and `distances` are dense row-major `num_queries × k` buffers in
/// rank order, best first. Unfilled ranks carry the `-1` id sentinel and
/// the metric's sentinel distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub num_queries: usize,
    pub k: usize,
    pub ids: Vec<VectorId>,
    pub distances: Vec<f32>,
    pub timing: TimingInfo,
}

impl SearchResult {
    pub(crate) fn empty(k: usize) -> Self {
        Self {
            num_queries: 0,
            k,
            ids: Vec::new(),
            distances: Vec::new(),
            timing: TimingInfo::default(),
        }
    }

    /// Ids of row `query`, best first.
    pub fn ids_row(&self, query: usize) -> &[VectorId] {
        &self.ids[query * self.k..(query + 1) * self.k]
    }

    /// Distances of row `query`, best first.
    pub fn distances_row(&self, query: usize) -> &[f32] {
        &self.distances[query * self.k..(query + 1) * self.k]
    }
}
