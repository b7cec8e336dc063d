//! Candidate generation: fusing curve windows, or sampling at random.
//!
//! For a query object, every selected curve contributes the objects inside
//! the query's window on that curve. The union over curves is the candidate
//! pool that later gets re-ranked exactly. Different curves break locality in
//! different places, so fusing a few curves with narrow windows usually beats
//! one curve with a wide window.
//!
//! With no curve selected, candidates are a uniform random sample instead,
//! which is the baseline the curves have to beat.

use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, trace};

use crate::curve::CurveSet;
use crate::window::CandidateWindow;
use crate::{CurveMask, KnnError, Result};

/// Deduplicated candidate ids for one query. Always contains the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    query: u32,
    ids: HashSet<u32>,
}

impl CandidateSet {
    /// A set holding only `query`.
    pub fn new(query: u32) -> Self {
        Self::with_capacity(query, 1)
    }

    pub fn with_capacity(query: u32, capacity: usize) -> Self {
        let mut ids = HashSet::with_capacity(capacity.max(1));
        ids.insert(query);
        Self { query, ids }
    }

    pub(crate) fn insert(&mut self, id: u32) -> bool {
        self.ids.insert(id)
    }

    pub(crate) fn extend_from_slice(&mut self, ids: &[u32]) {
        self.ids.extend(ids.iter().copied());
    }

    /// The query object.
    pub fn query(&self) -> u32 {
        self.query
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always false: the query itself is a candidate.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    /// Candidate ids, in no particular order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = u32> + '_ {
        self.ids.iter().copied()
    }

    pub fn is_superset(&self, other: &CandidateSet) -> bool {
        self.ids.is_superset(&other.ids)
    }

    /// Candidate ids, ascending.
    pub fn to_sorted_vec(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.ids.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Distance computations re-ranking this set costs, not counting the query itself.
    pub fn distance_computations(&self) -> usize {
        self.ids.len() - 1
    }
}

/// Union the query's windows over every curve in `mask`.
///
/// `positions` holds the query's cached position on each curve of `curves`;
/// a cached position that does not point back at the query is reported as
/// [`KnnError::InconsistentPosition`]. The half-width on curve `c` is
/// `unit * scale(c)`.
pub fn merge_candidates(
    curves: &CurveSet,
    query: u32,
    positions: &[u32],
    mask: CurveMask,
    unit: usize,
) -> Result<CandidateSet> {
    if mask.is_empty() {
        return Err(KnnError::InvalidParameter(
            "curve fusion needs at least one curve".to_string(),
        ));
    }
    if positions.len() != curves.len() {
        return Err(KnnError::InvalidParameter(format!(
            "{} cached positions for {} curves",
            positions.len(),
            curves.len()
        )));
    }

    let mut windows = Vec::with_capacity(mask.len());
    for c in mask {
        let curve = curves.curve(c).ok_or(KnnError::CurveOutOfRange {
            curve: c,
            curves: curves.len(),
        })?;

        let cached = positions[c] as usize;
        let recorded = curve.id_at(cached);
        if recorded != Some(query) {
            return Err(KnnError::InconsistentPosition {
                curve: c,
                id: query,
                cached,
                recorded,
            });
        }

        let window = CandidateWindow::compute(curve.len(), cached, curves.half_width(c, unit)?)?;
        if window.is_whole_curve() {
            debug!(curve = c, query, unit, "window covers the whole curve");
        }
        windows.push((curve, window));
    }

    let capacity = windows
        .iter()
        .map(|(_, w)| w.len())
        .sum::<usize>()
        .min(curves.object_count());
    let mut candidates = CandidateSet::with_capacity(query, capacity);
    for (curve, window) in &windows {
        candidates.extend_from_slice(curve.window_ids(window));
    }

    Ok(candidates)
}

/// Draw `min(sample_size, object_count)` distinct ids uniformly at random,
/// plus the query.
pub fn sample_candidates<R: Rng + ?Sized>(
    object_count: usize,
    query: u32,
    sample_size: usize,
    rng: &mut R,
) -> CandidateSet {
    let amount = sample_size.min(object_count);
    let sample = rand::seq::index::sample(rng, object_count, amount);

    let mut candidates = CandidateSet::with_capacity(query, amount + 1);
    for idx in sample.iter() {
        candidates.insert(idx as u32);
    }
    trace!(
        query,
        drawn = amount,
        candidates = candidates.len(),
        "sampled random candidates"
    );
    candidates
}
