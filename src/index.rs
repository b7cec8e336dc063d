//! The approximate kNN index: curve windows for recall, exact distances for order.
//!
//! Building happens once: every curve is sorted (in parallel), the position
//! cache is filled, and only then does the index value exist. After that the
//! index is immutable, so `&ApproximateKnnIndex` can be shared freely between
//! query threads without locking.
//!
//! ```rust
//! use curvenn::{ApproximateKnnIndex, CurveMask, Dataset, IndexParams};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let rows: Vec<[f32; 2]> = (0..100).map(|i| [i as f32 / 100.0, (i % 7) as f32]).collect();
//! let dataset = Dataset::from_rows(&rows)?;
//!
//! // Two toy curves: along x, and along y then x.
//! let keys: Vec<Box<dyn Fn(&[f32]) -> u64 + Send + Sync>> = vec![
//!     Box::new(|v: &[f32]| (v[0] * 1e6) as u64),
//!     Box::new(|v: &[f32]| ((v[1] as u64) << 32) | (v[0] * 1e6) as u64),
//! ];
//! let index = ApproximateKnnIndex::build(dataset, &keys, IndexParams::default())?;
//!
//! let mut rng = StdRng::seed_from_u64(0);
//! let result = index.query(42, CurveMask::all(2)?, 3, 5, &mut rng)?;
//! assert_eq!(result.neighbors()[0].id, 42);
//! assert_eq!(result.len(), 5);
//! # Ok::<(), curvenn::KnnError>(())
//! ```

use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::candidates::{merge_candidates, sample_candidates, CandidateSet};
use crate::curve::{CurveKey, CurveOrder, CurveSet, PositionCache};
use crate::distance::{Distance, DistanceMetric};
use crate::rerank::{rerank, RankedResult};
use crate::window::CandidateWindow;
use crate::{CurveMask, Dataset, KnnError, Result};

/// Index configuration.
///
/// Loadable through serde; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Scale factor per curve: `unit * scale` positions on each side.
    ///
    /// Empty means every curve uses `default_scale`.
    pub curve_scales: Vec<usize>,

    /// Scale for curves without an explicit entry.
    pub default_scale: usize,

    /// Scale used when no curve is selected; the random sample has
    /// `min(k, 2 * unit * fallback_scale)` objects.
    pub fallback_scale: usize,

    /// Exact metric used for re-ranking.
    pub metric: DistanceMetric,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            curve_scales: Vec::new(),
            default_scale: 1,
            fallback_scale: 1,
            metric: DistanceMetric::L1,
        }
    }
}

impl IndexParams {
    #[must_use]
    pub fn with_curve_scales(mut self, scales: Vec<usize>) -> Self {
        self.curve_scales = scales;
        self
    }

    #[must_use]
    pub fn with_default_scale(mut self, scale: usize) -> Self {
        self.default_scale = scale;
        self
    }

    #[must_use]
    pub fn with_fallback_scale(mut self, scale: usize) -> Self {
        self.fallback_scale = scale;
        self
    }

    #[must_use]
    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    /// One scale per curve, checked.
    pub fn resolve_scales(&self, curves: usize) -> Result<Vec<usize>> {
        if self.fallback_scale == 0 {
            return Err(KnnError::InvalidConfig(
                "fallback_scale must be at least 1".to_string(),
            ));
        }
        if self.curve_scales.is_empty() {
            if self.default_scale == 0 {
                return Err(KnnError::InvalidConfig(
                    "default_scale must be at least 1".to_string(),
                ));
            }
            return Ok(vec![self.default_scale; curves]);
        }
        if self.curve_scales.len() != curves {
            return Err(KnnError::ScaleCountMismatch {
                curves,
                scales: self.curve_scales.len(),
            });
        }
        Ok(self.curve_scales.clone())
    }
}

/// Build an index over `dataset` with one curve per key generator.
pub fn build_index<G: CurveKey>(
    dataset: Dataset,
    keys: &[G],
    params: IndexParams,
) -> Result<ApproximateKnnIndex> {
    ApproximateKnnIndex::build(dataset, keys, params)
}

/// Approximate kNN over a fixed dataset and a fixed set of curve orders.
#[derive(Debug)]
pub struct ApproximateKnnIndex<D = DistanceMetric> {
    dataset: Dataset,
    curves: CurveSet,
    positions: PositionCache,
    params: IndexParams,
    distance: D,
}

impl ApproximateKnnIndex<DistanceMetric> {
    /// Sort the dataset along every curve and cache all positions.
    pub fn build<G: CurveKey>(dataset: Dataset, keys: &[G], params: IndexParams) -> Result<Self> {
        check_build(&dataset, keys.len())?;
        let start = Instant::now();
        let scales = params.resolve_scales(keys.len())?;
        let curves = CurveSet::build(&dataset, keys, scales)?;
        let index = Self::assemble(dataset, curves, params);
        info!(
            objects = index.len(),
            curves = index.num_curves(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built curve index"
        );
        Ok(index)
    }

    /// Index over curve orders computed elsewhere.
    pub fn from_curves(dataset: Dataset, curves: Vec<CurveOrder>, params: IndexParams) -> Result<Self> {
        check_build(&dataset, curves.len())?;
        let scales = params.resolve_scales(curves.len())?;
        let curves = CurveSet::new(curves, scales, dataset.len())?;
        Ok(Self::assemble(dataset, curves, params))
    }

    fn assemble(dataset: Dataset, curves: CurveSet, params: IndexParams) -> Self {
        let positions = PositionCache::from_curves(&curves);
        let distance = params.metric;
        Self {
            dataset,
            curves,
            positions,
            params,
            distance,
        }
    }
}

fn check_build(dataset: &Dataset, curves: usize) -> Result<()> {
    if dataset.is_empty() {
        return Err(KnnError::EmptyDataset);
    }
    if curves > CurveMask::CAPACITY {
        return Err(KnnError::InvalidConfig(format!(
            "{curves} curves exceed the mask capacity of {}",
            CurveMask::CAPACITY
        )));
    }
    Ok(())
}

impl<D: Distance> ApproximateKnnIndex<D> {
    /// Replace the re-ranking distance, e.g. with a
    /// [`CountingDistance`](crate::distance::CountingDistance).
    pub fn with_distance<E: Distance>(self, distance: E) -> ApproximateKnnIndex<E> {
        ApproximateKnnIndex {
            dataset: self.dataset,
            curves: self.curves,
            positions: self.positions,
            params: self.params,
            distance,
        }
    }

    /// The k approximate nearest neighbors of object `id`.
    ///
    /// Candidates are the union of the windows of half-width
    /// `unit * scale(c)` on every curve `c` in `mask`; an empty mask draws a
    /// random sample from `rng` instead. The result always starts with the
    /// query itself unless duplicates tie with it at distance 0.
    pub fn query<R: Rng + ?Sized>(
        &self,
        id: u32,
        mask: CurveMask,
        unit: usize,
        k: usize,
        rng: &mut R,
    ) -> Result<RankedResult> {
        let candidates = self.candidates(id, mask, unit, k, rng)?;
        rerank(
            &candidates,
            self.dataset.vector(id)?,
            &self.dataset,
            &self.distance,
            k,
        )
    }

    /// [`query`](Self::query) with a random stream derived from `(seed, id)`.
    pub fn query_seeded(
        &self,
        id: u32,
        mask: CurveMask,
        unit: usize,
        k: usize,
        seed: u64,
    ) -> Result<RankedResult> {
        let mut rng = StdRng::seed_from_u64(query_seed(seed, id));
        self.query(id, mask, unit, k, &mut rng)
    }

    /// Query many objects in parallel.
    ///
    /// Each query gets its own random stream seeded from `(seed, id)`, so the
    /// output does not depend on thread scheduling. Results are in `ids` order;
    /// the first failing query aborts the batch.
    pub fn query_batch(
        &self,
        ids: &[u32],
        mask: CurveMask,
        unit: usize,
        k: usize,
        seed: u64,
    ) -> Result<Vec<RankedResult>> {
        let start = Instant::now();
        let results = ids
            .par_iter()
            .map(|&id| self.query_seeded(id, mask, unit, k, seed))
            .collect::<Result<Vec<_>>>()?;
        info!(
            queries = ids.len(),
            mask = ?mask,
            unit,
            k,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch query finished"
        );
        Ok(results)
    }

    /// The candidate pool `query` would re-rank, without re-ranking it.
    pub fn candidates<R: Rng + ?Sized>(
        &self,
        id: u32,
        mask: CurveMask,
        unit: usize,
        k: usize,
        rng: &mut R,
    ) -> Result<CandidateSet> {
        self.check_query(id, mask, k)?;

        if mask.is_empty() {
            let sample_size = self.fallback_sample_size(k, unit);
            debug!(query = id, sample_size, "no curve selected, sampling at random");
            return Ok(sample_candidates(self.len(), id, sample_size, rng));
        }

        let positions = self.positions.positions(id)?;
        merge_candidates(&self.curves, id, positions, mask, unit)
    }

    /// Window of object `id` on one curve for `unit` half-window units.
    pub fn window(&self, curve: usize, id: u32, unit: usize) -> Result<CandidateWindow> {
        let order = self.curves.curve(curve).ok_or(KnnError::CurveOutOfRange {
            curve,
            curves: self.num_curves(),
        })?;
        let position = order.position_of(id)?;
        CandidateWindow::compute(order.len(), position, self.curves.half_width(curve, unit)?)
    }

    /// Random sample size for an empty mask: `min(k, 2 * unit * fallback_scale)`.
    pub fn fallback_sample_size(&self, k: usize, unit: usize) -> usize {
        k.min(
            unit.saturating_mul(self.params.fallback_scale)
                .saturating_mul(2),
        )
    }

    fn check_query(&self, id: u32, mask: CurveMask, k: usize) -> Result<()> {
        if k == 0 {
            return Err(KnnError::InvalidParameter("k must be at least 1".to_string()));
        }
        if !self.dataset.contains(id) {
            return Err(KnnError::UnknownObject(id));
        }
        if !mask.is_empty() && self.curves.is_empty() {
            return Err(KnnError::NoCurves {
                requested: mask.len(),
            });
        }
        if let Some(curve) = mask.max_curve().filter(|&c| c >= self.num_curves()) {
            return Err(KnnError::CurveOutOfRange {
                curve,
                curves: self.num_curves(),
            });
        }
        Ok(())
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn curves(&self) -> &CurveSet {
        &self.curves
    }

    pub fn positions(&self) -> &PositionCache {
        &self.positions
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn distance(&self) -> &D {
        &self.distance
    }

    /// Number of indexed objects.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Always false: building rejects empty datasets.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn num_curves(&self) -> usize {
        self.curves.len()
    }
}

/// Per-query seed, mixed so neighboring ids get unrelated streams (splitmix64).
fn query_seed(seed: u64, id: u32) -> u64 {
    let mut z = seed ^ (u64::from(id)).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
