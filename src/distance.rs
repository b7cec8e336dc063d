//! Exact distance functions for re-ranking candidates.
//!
//! Candidate generation only decides *which* objects get compared; the final
//! order is always decided by an exact, symmetric distance. The default is the
//! Manhattan (L1) metric, but anything implementing [`Distance`] works,
//! including plain closures.
//!
//! ## Counting distance calls
//!
//! The number of distance evaluations is the cost model of this index (it is
//! what a curve window saves compared to a full scan). Instead of a global
//! counter, wrap the metric in a [`CountingDistance`]:
//!
//! ```rust
//! use curvenn::distance::{CountingDistance, Distance, DistanceMetric};
//!
//! let counted = CountingDistance::new(DistanceMetric::L1);
//! let d = counted.distance(&[0.0, 1.0], &[2.0, 3.0]);
//! assert_eq!(d, 4.0);
//! assert_eq!(counted.count(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// An exact distance between two dense vectors.
///
/// Implementations must be symmetric and non-negative. They are shared
/// read-only between query threads, hence `Send + Sync`.
pub trait Distance: Send + Sync {
    /// Distance between `a` and `b`.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;
}

impl<F> Distance for F
where
    F: Fn(&[f32], &[f32]) -> f32 + Send + Sync,
{
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self(a, b)
    }
}

/// Built-in distance metrics for dense vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Manhattan (L1) distance.
    #[default]
    L1,
    /// Euclidean (L2) distance.
    L2,
    /// Squared Euclidean distance (same ranking as L2, no square root).
    SquaredL2,
    /// Cosine distance $1 - \cos(a,b)$.
    Cosine,
}

impl DistanceMetric {
    /// Compute distance between two vectors.
    ///
    /// If dimensions mismatch, this returns `f32::INFINITY` (so it is never selected as a
    /// nearest neighbor).
    #[inline]
    #[must_use]
    pub fn compute(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L1 => l1_distance(a, b),
            DistanceMetric::L2 => l2_distance(a, b),
            DistanceMetric::SquaredL2 => l2_distance_squared(a, b),
            DistanceMetric::Cosine => cosine_distance(a, b),
        }
    }
}

impl Distance for DistanceMetric {
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.compute(a, b)
    }
}

/// Manhattan (L1) distance.
#[inline]
#[must_use]
pub fn l1_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

/// L2 (Euclidean) distance.
#[inline]
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

/// Squared L2 distance.
#[inline]
#[must_use]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Cosine distance $1 - \cos(a,b)$.
///
/// Computes norms, so inputs need not be normalized. A zero vector is at
/// distance 1 from everything.
#[inline]
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    const NORM_EPSILON: f32 = 1e-9;

    if a.len() != b.len() {
        return f32::INFINITY;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na < NORM_EPSILON || nb < NORM_EPSILON {
        return 1.0;
    }
    (1.0 - dot / (na * nb)).clamp(0.0, 2.0)
}

/// Decorator that counts how often the wrapped distance is evaluated.
///
/// The counter is atomic, so one instance can be shared by concurrent queries;
/// the total is then the sum over all of them.
#[derive(Debug, Default)]
pub struct CountingDistance<D> {
    inner: D,
    calls: AtomicU64,
}

impl<D> CountingDistance<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            calls: AtomicU64::new(0),
        }
    }

    /// Number of distance evaluations so far.
    pub fn count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Reset the counter, returning the previous value.
    pub fn reset(&self) -> u64 {
        self.calls.swap(0, Ordering::Relaxed)
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }
}

impl<D: Distance> Distance for CountingDistance<D> {
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.distance(a, b)
    }
}
