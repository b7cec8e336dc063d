//! Curve orders: total orders over the dataset induced by space-filling curves.
//!
//! A space-filling curve maps each vector to a scalar key that tends to keep
//! nearby points nearby. Sorting the dataset by that key yields a
//! [`CurveOrder`]; objects adjacent in the order are neighbor candidates.
//! Computing the key itself (Z-order, Peano, Hilbert, ...) is up to the caller
//! through [`CurveKey`].
//!
//! Several curves are held together in a [`CurveSet`], each with its own scale
//! factor, and a [`PositionCache`] remembers where every object sits on every
//! curve so a query never searches for its own position.

use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use crate::window::CandidateWindow;
use crate::{Dataset, KnnError, Result};

/// Maps a vector to its key along one curve.
///
/// Must be deterministic and defined for every vector of the dataset. Ties are
/// allowed; tied objects keep their dataset order.
///
/// Closures implement this trait:
///
/// ```rust
/// use curvenn::curve::CurveKey;
///
/// // Order along the first coordinate, quantized to a 16-bit grid.
/// let first_axis = |v: &[f32]| (v[0].clamp(0.0, 1.0) * 65535.0) as u32;
/// assert_eq!(first_axis.key(&[0.5, 0.9]), 32767);
/// ```
pub trait CurveKey: Send + Sync {
    /// Totally ordered key type.
    type Key: Ord + Send;

    fn key(&self, vector: &[f32]) -> Self::Key;
}

impl<F, K> CurveKey for F
where
    F: Fn(&[f32]) -> K + Send + Sync,
    K: Ord + Send,
{
    type Key = K;

    #[inline]
    fn key(&self, vector: &[f32]) -> K {
        self(vector)
    }
}

/// One curve's order over all objects, with the inverse position lookup.
///
/// Invariant: `ids` is a permutation of `0..len` and
/// `position_of(ids[i]) == i` for all `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurveOrder {
    /// Object ids sorted by curve key.
    ids: Vec<u32>,
    /// Object id -> position in `ids`.
    positions: Vec<u32>,
}

impl CurveOrder {
    /// Sort the dataset by `key`.
    pub fn build<K: CurveKey + ?Sized>(dataset: &Dataset, key: &K) -> Result<Self> {
        if dataset.is_empty() {
            return Err(KnnError::EmptyDataset);
        }

        let mut keyed: Vec<(K::Key, u32)> =
            dataset.iter().map(|(id, v)| (key.key(v), id)).collect();
        // Stable: equal keys stay in dataset order.
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        Self::from_permutation(keyed.into_iter().map(|(_, id)| id).collect())
    }

    /// Wrap an explicit order. It must be a permutation of `0..ids.len()`.
    pub fn from_permutation(ids: Vec<u32>) -> Result<Self> {
        if ids.is_empty() {
            return Err(KnnError::EmptyDataset);
        }
        let n = ids.len();
        if u32::try_from(n).is_err() {
            return Err(KnnError::InvalidParameter(
                "curve exceeds u32::MAX objects".to_string(),
            ));
        }

        let mut positions = vec![u32::MAX; n];
        for (pos, &id) in ids.iter().enumerate() {
            let slot = positions.get_mut(id as usize).ok_or_else(|| {
                KnnError::NotAPermutation(format!("id {id} out of range for {n} objects"))
            })?;
            if *slot != u32::MAX {
                return Err(KnnError::NotAPermutation(format!(
                    "id {id} appears at positions {} and {pos}",
                    *slot
                )));
            }
            *slot = pos as u32;
        }

        Ok(Self { ids, positions })
    }

    /// Number of objects on the curve.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Object at `position`.
    #[inline]
    pub fn id_at(&self, position: usize) -> Option<u32> {
        self.ids.get(position).copied()
    }

    /// Position of object `id`; an unknown id is an error.
    #[inline]
    pub fn position_of(&self, id: u32) -> Result<usize> {
        self.positions
            .get(id as usize)
            .map(|&p| p as usize)
            .ok_or(KnnError::UnknownObject(id))
    }

    /// Object ids in curve order.
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Object ids covered by `window`.
    ///
    /// # Panics
    ///
    /// If the window was computed for a longer curve.
    #[inline]
    pub fn window_ids(&self, window: &CandidateWindow) -> &[u32] {
        &self.ids[window.range()]
    }
}

/// The fixed collection of curves of an index, with per-curve scale factors.
///
/// All curves order the same `object_count` objects.
#[derive(Debug, Clone)]
pub struct CurveSet {
    curves: Vec<CurveOrder>,
    scales: Vec<usize>,
    object_count: usize,
}

impl CurveSet {
    /// Assemble curves with one scale factor each.
    pub fn new(curves: Vec<CurveOrder>, scales: Vec<usize>, object_count: usize) -> Result<Self> {
        if object_count == 0 {
            return Err(KnnError::EmptyDataset);
        }
        if scales.len() != curves.len() {
            return Err(KnnError::ScaleCountMismatch {
                curves: curves.len(),
                scales: scales.len(),
            });
        }
        if let Some(c) = scales.iter().position(|&s| s == 0) {
            return Err(KnnError::InvalidConfig(format!(
                "scale factor of curve {c} must be at least 1"
            )));
        }
        if let Some((c, curve)) = curves
            .iter()
            .enumerate()
            .find(|(_, curve)| curve.len() != object_count)
        {
            return Err(KnnError::InvalidConfig(format!(
                "curve {c} orders {} objects, dataset has {object_count}",
                curve.len()
            )));
        }

        Ok(Self {
            curves,
            scales,
            object_count,
        })
    }

    /// Build one order per key generator. Curves are sorted in parallel.
    pub fn build<G: CurveKey>(dataset: &Dataset, keys: &[G], scales: Vec<usize>) -> Result<Self> {
        let curves = keys
            .par_iter()
            .enumerate()
            .map(|(c, key)| -> Result<CurveOrder> {
                let start = Instant::now();
                let order = CurveOrder::build(dataset, key)?;
                debug!(
                    curve = c,
                    objects = order.len(),
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "built curve order"
                );
                Ok(order)
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(curves, scales, dataset.len())
    }

    /// Number of curves.
    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }

    /// Number of objects every curve orders.
    pub fn object_count(&self) -> usize {
        self.object_count
    }

    pub fn curve(&self, curve: usize) -> Option<&CurveOrder> {
        self.curves.get(curve)
    }

    pub fn scale(&self, curve: usize) -> Option<usize> {
        self.scales.get(curve).copied()
    }

    pub fn scales(&self) -> &[usize] {
        &self.scales
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CurveOrder> {
        self.curves.iter()
    }

    /// Half-width in positions on `curve` for `unit` half-window units.
    pub fn half_width(&self, curve: usize, unit: usize) -> Result<usize> {
        let scale = self.scale(curve).ok_or(KnnError::CurveOutOfRange {
            curve,
            curves: self.len(),
        })?;
        Ok(unit.saturating_mul(scale))
    }
}

/// Every object's position on every curve, in one flat `objects x curves` table.
///
/// Built once from a [`CurveSet`] so a query reads its positions with a
/// single lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionCache {
    table: Vec<u32>,
    curves: usize,
    objects: usize,
}

impl PositionCache {
    pub fn from_curves(curves: &CurveSet) -> Self {
        let num_curves = curves.len();
        let objects = curves.object_count();
        let mut table = vec![0u32; objects * num_curves];

        for (c, curve) in curves.iter().enumerate() {
            for (pos, &id) in curve.ids().iter().enumerate() {
                table[id as usize * num_curves + c] = pos as u32;
            }
        }

        Self {
            table,
            curves: num_curves,
            objects,
        }
    }

    /// Positions of object `id`, one per curve.
    #[inline]
    pub fn positions(&self, id: u32) -> Result<&[u32]> {
        let idx = id as usize;
        if idx >= self.objects {
            return Err(KnnError::UnknownObject(id));
        }
        let start = idx * self.curves;
        Ok(&self.table[start..start + self.curves])
    }

    pub fn num_curves(&self) -> usize {
        self.curves
    }

    pub fn num_objects(&self) -> usize {
        self.objects
    }
}
