//! Partition store
//!
//! Holds the live partitions of the two-level index. Each partition is a
//! contiguous row-major block of vectors plus an aligned id column. The
//! store is a read-only snapshot for the duration of a search; writers are
//! excluded by construction, so no lock guards partition contents.

use std::collections::BTreeMap;

use crate::types::{PartitionId, VectorId};
use crate::{Error, Result};

/// A contiguous batch of `(id, vector)` pairs assigned to one centroid.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    ids: Vec<VectorId>,
    vectors: Vec<f32>,
}

impl Partition {
    /// Number of vectors in the partition.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[VectorId] {
        &self.ids
    }

    /// The `row`-th vector of the block.
    pub fn vector(&self, row: usize, dim: usize) -> &[f32] {
        &self.vectors[row * dim..(row + 1) * dim]
    }
}

/// Live partitions keyed by partition id.
///
/// Keys iterate in ascending order, which the scan engine relies on for
/// deterministic job construction.
#[derive(Debug, Clone)]
pub struct PartitionStore {
    dim: usize,
    partitions: BTreeMap<PartitionId, Partition>,
}

impl PartitionStore {
    /// Create an empty store for vectors of dimension `dim`.
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::invalid_input("vector dimension must be positive"));
        }
        Ok(Self {
            dim,
            partitions: BTreeMap::new(),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Insert a partition. `vectors` is row-major and must hold exactly one
    /// row of `dim` floats per id. A partition may be empty.
    pub fn insert_partition(
        &mut self,
        partition_id: PartitionId,
        ids: Vec<VectorId>,
        vectors: Vec<f32>,
    ) -> Result<()> {
        if partition_id < 0 {
            return Err(Error::invalid_input(format!(
                "partition id must be non-negative, got {partition_id}"
            )));
        }
        if vectors.len() != ids.len() * self.dim {
            return Err(Error::invalid_input(format!(
                "partition {partition_id} holds {} ids but {} floats (dim {})",
                ids.len(),
                vectors.len(),
                self.dim
            )));
        }
        if self.partitions.contains_key(&partition_id) {
            return Err(Error::invalid_input(format!(
                "partition {partition_id} already exists"
            )));
        }
        self.partitions.insert(partition_id, Partition { ids, vectors });
        Ok(())
    }

    /// Fetch a partition by id. Unknown ids are a collaborator failure from
    /// the coordinator's point of view.
    pub fn get(&self, partition_id: PartitionId) -> Result<&Partition> {
        self.partitions.get(&partition_id).ok_or_else(|| {
            Error::backend(format!("partition {partition_id} is not in the store"))
        })
    }

    /// All live partition ids in ascending order.
    pub fn partition_ids(&self) -> Vec<PartitionId> {
        self.partitions.keys().copied().collect()
    }

    /// Number of vectors in one partition, zero for unknown ids.
    pub fn vector_count(&self, partition_id: PartitionId) -> usize {
        self.partitions
            .get(&partition_id)
            .map_or(0, |partition| partition.len())
    }

    /// Total number of vectors across all partitions.
    pub fn total_vectors(&self) -> usize {
        self.partitions.values().map(Partition::len).sum()
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }
}
