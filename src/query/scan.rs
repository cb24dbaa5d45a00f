//! Scan engine
//!
//! Distance computation over candidate partitions. Two modes share one
//! output contract: *batched* amortizes a partition block across every
//! query routed to it, *serial* walks one query's partitions in selector
//! order. Both leave sentinels untouched for candidates they never visit.

use std::collections::HashSet;
use std::sync::Arc;

use crate::index::{inner_product, l2_squared};
use crate::partition::PartitionStore;
use crate::query::topk::TopKBuffer;
use crate::types::{DistanceMetric, PartitionId, VectorId};
use crate::Result;

/// Immutable per-search state shared by every scan job.
#[derive(Debug)]
pub(crate) struct ScanContext {
    pub queries: Arc<Vec<f32>>,
    pub dim: usize,
    /// Buffer capacity for this scan; exceeds `k` when post-filtering.
    pub fetch_k: usize,
    pub metric: DistanceMetric,
    pub store: Arc<PartitionStore>,
    /// Ids admitted by the pre-filter predicate; `None` admits everything.
    pub mask: Option<Arc<HashSet<VectorId>>>,
}

impl ScanContext {
    pub fn query(&self, index: usize) -> &[f32] {
        &self.queries[index * self.dim..(index + 1) * self.dim]
    }

    fn admits(&self, id: VectorId) -> bool {
        match &self.mask {
            Some(mask) => mask.contains(&id),
            None => true,
        }
    }

    fn distance(&self, query: &[f32], entry: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::L2 => l2_squared(query, entry),
            DistanceMetric::InnerProduct => inner_product(query, entry),
        }
    }
}

/// Batched job unit: one partition block against every query routed to it.
///
/// Returns one partial buffer per query index. Empty partitions contribute
/// nothing.
pub(crate) fn scan_partition_batched(
    ctx: &ScanContext,
    partition_id: PartitionId,
    query_indices: &[usize],
) -> Result<Vec<(usize, TopKBuffer)>> {
    let partition = ctx.store.get(partition_id)?;
    let mut buffers: Vec<(usize, TopKBuffer)> = query_indices
        .iter()
        .map(|&q| (q, TopKBuffer::new(ctx.fetch_k, ctx.metric)))
        .collect();

    // Outer loop over rows keeps each partition vector hot across queries.
    for row in 0..partition.len() {
        let id = partition.ids()[row];
        if !ctx.admits(id) {
            continue;
        }
        let entry = partition.vector(row, ctx.dim);
        for (q, buffer) in buffers.iter_mut() {
            buffer.insert(ctx.distance(ctx.query(*q), entry), id);
        }
    }

    Ok(buffers)
}

/// Serial job unit: one `(query, partition)` pair.
pub(crate) fn scan_partition_serial(
    ctx: &ScanContext,
    partition_id: PartitionId,
    query_index: usize,
) -> Result<TopKBuffer> {
    let partition = ctx.store.get(partition_id)?;
    let query = ctx.query(query_index);
    let mut buffer = TopKBuffer::new(ctx.fetch_k, ctx.metric);

    for row in 0..partition.len() {
        let id = partition.ids()[row];
        if !ctx.admits(id) {
            continue;
        }
        buffer.insert(ctx.distance(query, partition.vector(row, ctx.dim)), id);
    }

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::PartitionStore;
    use crate::types::NO_ID;

    fn context(mask: Option<HashSet<VectorId>>) -> ScanContext {
        let mut store = PartitionStore::new(2).unwrap();
        // Partition 0: ids 0..4 at x = id, y = 0.
        store
            .insert_partition(
                0,
                vec![0, 1, 2, 3],
                vec![0.0, 0.0, 1.0, 0.0, 2.0, 0.0, 3.0, 0.0],
            )
            .unwrap();
        store.insert_partition(1, Vec::new(), Vec::new()).unwrap();

        ScanContext {
            queries: Arc::new(vec![0.0, 0.0, 3.0, 0.0]),
            dim: 2,
            fetch_k: 2,
            metric: DistanceMetric::L2,
            store: Arc::new(store),
            mask: mask.map(Arc::new),
        }
    }

    #[test]
    fn batched_scan_fills_each_routed_query() {
        let ctx = context(None);
        let buffers = scan_partition_batched(&ctx, 0, &[0, 1]).unwrap();
        let rows: Vec<_> = buffers
            .into_iter()
            .map(|(q, buffer)| (q, buffer.into_ranked()))
            .collect();
        assert_eq!(rows[0].1[0], (0.0, 0));
        assert_eq!(rows[1].1[0], (0.0, 3));
    }

    #[test]
    fn serial_scan_matches_batched_results() {
        let ctx = context(None);
        let batched = scan_partition_batched(&ctx, 0, &[1]).unwrap();
        let serial = scan_partition_serial(&ctx, 0, 1).unwrap();
        assert_eq!(
            batched.into_iter().next().unwrap().1.into_ranked(),
            serial.into_ranked()
        );
    }

    #[test]
    fn empty_partition_contributes_nothing() {
        let ctx = context(None);
        let buffer = scan_partition_serial(&ctx, 1, 0).unwrap();
        assert!(buffer.is_empty());
    }

    #[test]
    fn mask_skips_rejected_rows() {
        let ctx = context(Some([2, 3].into_iter().collect()));
        let buffer = scan_partition_serial(&ctx, 0, 0).unwrap();
        let row = buffer.into_ranked();
        assert_eq!(row[0], (4.0, 2));
        assert_eq!(row[1], (9.0, 3));
    }

    #[test]
    fn missing_partition_is_surfaced() {
        let ctx = context(None);
        assert!(scan_partition_serial(&ctx, 42, 0).is_err());
    }

    #[test]
    fn small_partition_leaves_sentinel_tail() {
        let ctx = context(Some([0].into_iter().collect()));
        let row = scan_partition_serial(&ctx, 0, 0).unwrap().into_ranked();
        assert_eq!(row[0], (0.0, 0));
        assert_eq!(row[1].1, NO_ID);
    }
}
