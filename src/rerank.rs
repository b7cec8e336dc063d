//! Exact re-ranking of a candidate pool down to the k nearest.
//!
//! Every candidate (the query included, at distance 0) is compared to the
//! query vector with the exact distance. A max-heap capped at `k` keeps the k
//! best seen so far: `O(|candidates| log k)` time, `O(k)` extra space.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::candidates::CandidateSet;
use crate::distance::Distance;
use crate::{Dataset, Result};

/// One re-ranked neighbor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: u32,
    pub distance: f32,
}

/// Heap entry ordered by `(distance, id)`.
///
/// The id breaks distance ties so the retained set does not depend on the
/// order candidates arrive in.
#[derive(Debug, Clone, Copy)]
struct MaxEntry(Neighbor);

impl PartialEq for MaxEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MaxEntry {}

impl Ord for MaxEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: larger distance = higher priority
        // total_cmp keeps NaN ordered (it sorts last and is evicted first)
        self.0
            .distance
            .total_cmp(&other.0.distance)
            .then_with(|| self.0.id.cmp(&other.0.id))
    }
}

impl PartialOrd for MaxEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap holding at most `capacity` neighbors: the smallest seen so far.
#[derive(Debug, Clone)]
pub struct BoundedHeap {
    heap: BinaryHeap<MaxEntry>,
    capacity: usize,
}

impl BoundedHeap {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.saturating_add(1).min(1 << 16)),
            capacity,
        }
    }

    /// Offer a neighbor. Returns whether it was kept.
    pub fn push(&mut self, id: u32, distance: f32) -> bool {
        let entry = MaxEntry(Neighbor { id, distance });
        if self.heap.len() < self.capacity {
            self.heap.push(entry);
            return true;
        }
        match self.heap.peek_mut() {
            Some(mut worst) if entry < *worst => {
                // Evict the current maximum; PeekMut restores heap order on drop.
                *worst = entry;
                true
            }
            _ => false,
        }
    }

    /// Largest retained distance.
    pub fn worst_distance(&self) -> Option<f32> {
        self.heap.peek().map(|e| e.0.distance)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drain into neighbors sorted by non-decreasing distance.
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec().into_iter().map(|e| e.0).collect()
    }
}

/// Up to k neighbors sorted by non-decreasing distance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RankedResult {
    neighbors: Vec<Neighbor>,
    candidates: usize,
}

impl RankedResult {
    pub fn neighbors(&self) -> &[Neighbor] {
        &self.neighbors
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Neighbor> {
        self.neighbors.iter()
    }

    /// Neighbor ids, nearest first.
    pub fn ids(&self) -> Vec<u32> {
        self.neighbors.iter().map(|n| n.id).collect()
    }

    /// Distance of the farthest returned neighbor (the approximate k-distance).
    pub fn kth_distance(&self) -> Option<f32> {
        self.neighbors.last().map(|n| n.distance)
    }

    /// Size of the candidate pool this result was ranked from.
    pub fn candidates_examined(&self) -> usize {
        self.candidates
    }

    pub fn into_vec(self) -> Vec<Neighbor> {
        self.neighbors
    }

    /// `(id, distance)` pairs, nearest first.
    pub fn to_pairs(&self) -> Vec<(u32, f32)> {
        self.neighbors.iter().map(|n| (n.id, n.distance)).collect()
    }
}

impl IntoIterator for RankedResult {
    type Item = Neighbor;
    type IntoIter = std::vec::IntoIter<Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbors.into_iter()
    }
}

impl<'a> IntoIterator for &'a RankedResult {
    type Item = &'a Neighbor;
    type IntoIter = std::slice::Iter<'a, Neighbor>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbors.iter()
    }
}

/// Keep the `k` candidates nearest to `query` under `distance`.
///
/// Unknown candidate ids are an error. Fewer than `k` candidates simply give
/// a shorter result.
pub fn rerank<D: Distance + ?Sized>(
    candidates: &CandidateSet,
    query: &[f32],
    dataset: &Dataset,
    distance: &D,
    k: usize,
) -> Result<RankedResult> {
    let mut heap = BoundedHeap::new(k);
    for id in candidates.iter() {
        let vector = dataset.vector(id)?;
        heap.push(id, distance.distance(query, vector));
    }

    Ok(RankedResult {
        neighbors: heap.into_sorted_vec(),
        candidates: candidates.len(),
    })
}
