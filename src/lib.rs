//! curvenn: approximate k-nearest-neighbor search over space-filling-curve orders.
//!
//! Sort the dataset along several space-filling curves once. To find the
//! neighbors of an object, take the objects next to it on a few of those
//! orders, then rank that small pool with the exact distance.
//!
//! - `curve`: curve orders, per-curve scales, the position cache
//! - `window`: the boundary-aware window around a position
//! - `candidates`: fusing windows across curves, random-sampling fallback
//! - `rerank`: bounded top-k selection with exact distances
//! - `index`: everything composed behind [`ApproximateKnnIndex::query`]
//!
//! # Critical Nuances
//!
//! ## Why several curves
//!
//! Any space-filling curve keeps *most* close pairs close, but every curve
//! has seams: two points on either side of a seam are neighbors in space and
//! far apart in the order. Different curves (or the same curve under a
//! different shift) put their seams in different places, so the union of
//! narrow windows on several curves recovers neighbors that one wide window
//! on a single curve misses.
//!
//! ## Cost model
//!
//! Query cost is dominated by exact distance computations, one per candidate.
//! The candidate count is at most `sum over selected curves of (2h + 1)`, and
//! less when windows overlap. Wrap the metric in a
//! [`CountingDistance`](distance::CountingDistance) to measure it.
//!
//! ## Random fallback
//!
//! An empty [`CurveMask`] replaces curve windows with a uniform random sample
//! of the same budget. It exists as the baseline: a curve configuration that
//! does not beat it at equal candidate count is not helping.
//!
//! ## Curve keys are external
//!
//! This crate does not compute Z-order, Peano or Hilbert keys. Anything that
//! maps a vector to an `Ord` key deterministically is a [`CurveKey`].

pub mod candidates;
pub mod curve;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod index;
pub mod mask;
pub mod rerank;
pub mod window;

// Re-exports
pub use candidates::CandidateSet;
pub use curve::{CurveKey, CurveOrder, CurveSet, PositionCache};
pub use dataset::Dataset;
pub use distance::{CountingDistance, Distance, DistanceMetric};
pub use error::{KnnError, Result};
pub use index::{build_index, ApproximateKnnIndex, IndexParams};
pub use mask::CurveMask;
pub use rerank::{Neighbor, RankedResult};
pub use window::{CandidateWindow, WindowKind};
