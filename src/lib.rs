//! Quiver - query coordinator for IVF-partitioned vector search
//!
//! Quiver dispatches batches of query vectors over a two-level inverted
//! index: a flat parent index routes each query to its closest partitions,
//! a scan engine computes distances inside those partitions (inline or on
//! a worker pool), and bounded top-k buffers merge the partial results
//! into ranked `(id, distance)` rows with sentinel padding. Attribute
//! predicates can run before distance computation or against an oversized
//! candidate set afterwards.

pub mod attrs;
pub mod config;
pub mod error;
pub mod index;
pub mod partition;
pub mod query;
pub mod types;

pub use config::CoordinatorConfig;
pub use error::{Error, Result};
pub use query::{
    AttributeFilter, FilterStrategy, QueryCoordinator, SearchParams, SearchResult,
};
pub use types::{DistanceMetric, PartitionId, TimingInfo, VectorId, NO_ID, NO_PARTITION};
