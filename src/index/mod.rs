//! Flat (exhaustive) index over partition centroids
//!
//! The parent level of the two-level structure: a dense row-major block of
//! centroids searched exhaustively. Rows come back in ascending-distance
//! order with ties broken by smaller id, padded with sentinels when `k`
//! exceeds the number of entries.

use crate::types::{DistanceMetric, VectorId, NO_ID};
use crate::{Error, Result};

/// Exhaustive ANN index over a dense block of vectors with i64 ids.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dim: usize,
    metric: DistanceMetric,
    ids: Vec<VectorId>,
    vectors: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: DistanceMetric) -> Result<Self> {
        if dim == 0 {
            return Err(Error::invalid_input("vector dimension must be positive"));
        }
        Ok(Self {
            dim,
            metric,
            ids: Vec::new(),
            vectors: Vec::new(),
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append `ids.len()` rows to the index. `vectors` is row-major.
    pub fn add(&mut self, ids: &[VectorId], vectors: &[f32]) -> Result<()> {
        if vectors.len() != ids.len() * self.dim {
            return Err(Error::invalid_input(format!(
                "expected {} floats for {} rows of dim {}, got {}",
                ids.len() * self.dim,
                ids.len(),
                self.dim,
                vectors.len()
            )));
        }
        self.ids.extend_from_slice(ids);
        self.vectors.extend_from_slice(vectors);
        Ok(())
    }

    /// Exhaustive batch top-k. Returns `(distances, ids)` as flat row-major
    /// `N×k` buffers in rank order, best first.
    pub fn search(&self, queries: &[f32], k: usize) -> Result<(Vec<f32>, Vec<VectorId>)> {
        if k == 0 {
            return Err(Error::invalid_input("k must be positive"));
        }
        if queries.len() % self.dim != 0 {
            return Err(Error::invalid_input(format!(
                "query buffer length {} is not a multiple of dim {}",
                queries.len(),
                self.dim
            )));
        }

        let num_queries = queries.len() / self.dim;
        let mut distances = Vec::with_capacity(num_queries * k);
        let mut ids = Vec::with_capacity(num_queries * k);

        let mut scored: Vec<(f32, VectorId)> = Vec::with_capacity(self.ids.len());
        for query in queries.chunks_exact(self.dim) {
            scored.clear();
            for (row, &id) in self.ids.iter().enumerate() {
                let entry = &self.vectors[row * self.dim..(row + 1) * self.dim];
                let distance = match self.metric {
                    DistanceMetric::L2 => l2_squared(query, entry),
                    DistanceMetric::InnerProduct => inner_product(query, entry),
                };
                scored.push((distance, id));
            }
            scored.sort_by(|a, b| {
                self.metric
                    .sort_key(a.0)
                    .total_cmp(&self.metric.sort_key(b.0))
                    .then_with(|| a.1.cmp(&b.1))
            });

            for rank in 0..k {
                match scored.get(rank) {
                    Some(&(distance, id)) => {
                        distances.push(distance);
                        ids.push(id);
                    }
                    None => {
                        distances.push(self.metric.sentinel());
                        ids.push(NO_ID);
                    }
                }
            }
        }

        Ok((distances, ids))
    }
}

pub(crate) fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..a.len() {
        let diff = a[i] - b[i];
        sum += diff * diff;
    }
    sum
}

pub(crate) fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for i in 0..a.len() {
        sum += a[i] * b[i];
    }
    sum
}
