//! Bounded top-k buffers
//!
//! Each query owns one buffer of capacity `k`. The backing binary heap
//! keeps the *worst* retained candidate at the root so eviction is O(1)
//! after an O(log k) insert. Ordering is over `(sort key, id)`, which makes
//! the retained set unique for a fixed candidate stream regardless of
//! insertion order — the property the worker merge relies on.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::{DistanceMetric, VectorId, NO_ID};

/// One retained candidate. The heap is a max-heap over `(key, id)`, so its
/// root is the candidate to evict next.
#[derive(Debug, Clone, Copy)]
struct HeapSlot {
    key: f32,
    distance: f32,
    id: VectorId,
}

impl PartialEq for HeapSlot {
    fn eq(&self, other: &Self) -> bool {
        self.key.to_bits() == other.key.to_bits() && self.id == other.id
    }
}

impl Eq for HeapSlot {}

impl PartialOrd for HeapSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.key.total_cmp(&other.key) {
            Ordering::Equal => self.id.cmp(&other.id),
            ordering => ordering,
        }
    }
}

/// Bounded buffer of the best `k` candidates seen so far.
#[derive(Debug, Clone)]
pub struct TopKBuffer {
    k: usize,
    metric: DistanceMetric,
    heap: BinaryHeap<HeapSlot>,
}

impl TopKBuffer {
    pub fn new(k: usize, metric: DistanceMetric) -> Self {
        Self {
            k,
            metric,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer a candidate; keeps it only if it beats the current worst.
    pub fn insert(&mut self, distance: f32, id: VectorId) {
        if self.k == 0 {
            return;
        }
        let slot = HeapSlot {
            key: self.metric.sort_key(distance),
            distance,
            id,
        };
        if self.heap.len() < self.k {
            self.heap.push(slot);
        } else if let Some(worst) = self.heap.peek() {
            if slot.cmp(worst) == Ordering::Less {
                self.heap.pop();
                self.heap.push(slot);
            }
        }
    }

    /// Fold another buffer's candidates into this one.
    pub fn merge(&mut self, other: TopKBuffer) {
        for slot in other.heap {
            self.insert(slot.distance, slot.id);
        }
    }

    /// Extract the ranked result row, best first, padded with sentinels to
    /// exactly `k` entries.
    pub fn into_ranked(self) -> Vec<(f32, VectorId)> {
        let k = self.k;
        let sentinel = (self.metric.sentinel(), NO_ID);
        let mut row: Vec<(f32, VectorId)> = self
            .heap
            .into_sorted_vec()
            .into_iter()
            .map(|slot| (slot.distance, slot.id))
            .collect();
        row.resize(k, sentinel);
        row
    }
}
