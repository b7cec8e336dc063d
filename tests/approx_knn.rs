//! End-to-end behavior of the curve index.
//!
//! Covers the candidate-set guarantees (query always present, window nesting,
//! fusion monotonicity), agreement of the bounded re-ranker with a sorted
//! scan, the random fallback, and reproducibility across threads.

use std::collections::HashSet;

use curvenn::{
    ApproximateKnnIndex, CandidateSet, CurveMask, CurveOrder, Dataset, Distance, DistanceMetric,
    IndexParams, KnnError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N: usize = 400;
const CURVES: usize = 3;

/// Interleave the low 16 bits of x and y (Z-order).
fn morton2(x: u32, y: u32) -> u64 {
    let mut key = 0u64;
    for bit in 0..16 {
        key |= u64::from((x >> bit) & 1) << (2 * bit);
        key |= u64::from((y >> bit) & 1) << (2 * bit + 1);
    }
    key
}

fn quantize(v: f32) -> u32 {
    (v.rem_euclid(1.0) * 65535.0) as u32
}

type Key = Box<dyn Fn(&[f32]) -> u64 + Send + Sync>;

/// Z-order under three different shifts, so seams fall in different places.
fn shifted_z_keys() -> Vec<Key> {
    [(0.0_f32, 0.0_f32), (0.37, 0.21), (0.71, 0.53)]
        .into_iter()
        .map(|(dx, dy)| -> Key {
            Box::new(move |v: &[f32]| morton2(quantize(v[0] + dx), quantize(v[1] + dy)))
        })
        .collect()
}

fn uniform_rows(n: usize, seed: u64) -> Vec<[f32; 2]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| [rng.random::<f32>(), rng.random::<f32>()]).collect()
}

fn build(params: IndexParams) -> ApproximateKnnIndex {
    let dataset = Dataset::from_rows(&uniform_rows(N, 42)).expect("dataset");
    ApproximateKnnIndex::build(dataset, &shifted_z_keys(), params).expect("index")
}

fn identity_index(n: u32) -> ApproximateKnnIndex {
    let rows: Vec<[f32; 1]> = (0..n).map(|i| [i as f32]).collect();
    let dataset = Dataset::from_rows(&rows).unwrap();
    let order = CurveOrder::from_permutation((0..n).collect()).unwrap();
    ApproximateKnnIndex::from_curves(dataset, vec![order], IndexParams::default()).unwrap()
}

/// Sorted full scan of the candidate pool, the reference for the bounded heap.
fn brute_force_top_k<D: Distance>(
    candidates: &CandidateSet,
    dataset: &Dataset,
    distance: &D,
    query: &[f32],
    k: usize,
) -> Vec<(u32, f32)> {
    let mut all: Vec<(u32, f32)> = candidates
        .iter()
        .map(|id| (id, distance.distance(query, dataset.vector(id).unwrap())))
        .collect();
    all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    all.truncate(k);
    all
}

fn every_mask() -> impl Iterator<Item = CurveMask> {
    (0..1u64 << CURVES).map(CurveMask::from_bits)
}

// =============================================================================
// Candidate windows
// =============================================================================

#[test]
fn identity_curve_boundary_scenario() {
    let index = identity_index(10);
    let mask = CurveMask::single(0);
    let mut rng = StdRng::seed_from_u64(0);

    let expected: [(u32, &[u32]); 3] = [
        (1, &[0, 1, 2, 3, 4]),
        (5, &[3, 4, 5, 6, 7]),
        (8, &[5, 6, 7, 8, 9]),
    ];
    for (query, ids) in expected {
        let window = index.window(0, query, 2).unwrap();
        assert_eq!(window.len(), 5);
        let cands = index.candidates(query, mask, 2, 5, &mut rng).unwrap();
        assert_eq!(cands.to_sorted_vec(), ids, "query {query}");
    }
}

#[test]
fn single_curve_zero_width_is_only_the_query() {
    let index = build(IndexParams::default().with_default_scale(10));
    let mut rng = StdRng::seed_from_u64(0);
    for c in 0..CURVES {
        for id in [0, 17, 399] {
            let cands = index
                .candidates(id, CurveMask::single(c), 0, 10, &mut rng)
                .unwrap();
            assert_eq!(cands.to_sorted_vec(), vec![id]);
        }
    }
}

#[test]
fn candidates_always_contain_the_query() {
    let index = build(IndexParams::default().with_curve_scales(vec![3, 5, 7]));
    let mut rng = StdRng::seed_from_u64(11);
    for id in (0..N as u32).step_by(13) {
        for mask in every_mask() {
            for unit in 0..6 {
                let cands = index.candidates(id, mask, unit, 20, &mut rng).unwrap();
                assert!(cands.contains(id), "id={id} mask={mask:?} unit={unit}");
                assert!(!cands.is_empty() && cands.len() <= N);
            }
        }
    }
}

#[test]
fn wider_windows_nest_near_both_ends() {
    let index = build(IndexParams::default().with_default_scale(4));
    let mut rng = StdRng::seed_from_u64(0);

    // Objects at the first and last positions of curve 0 exercise the clamp
    // transition: a symmetric window becomes clamped as h grows, and then the
    // whole curve. The larger window must still contain the smaller one.
    let curve = index.curves().curve(0).unwrap();
    let edge_positions = [0, 1, 2, 3, 5, 8, N - 9, N - 6, N - 4, N - 3, N - 2, N - 1];
    for pos in edge_positions {
        let id = curve.id_at(pos).unwrap();
        for mask in every_mask().filter(|m| !m.is_empty()) {
            let mut previous = index.candidates(id, mask, 0, 10, &mut rng).unwrap();
            for unit in 1..=60 {
                let current = index.candidates(id, mask, unit, 10, &mut rng).unwrap();
                assert!(
                    current.is_superset(&previous),
                    "pos={pos} mask={mask:?} unit={unit}"
                );
                previous = current;
            }
            // unit 60 * scale 4 >= N / 2: every selected curve is covered completely.
            assert_eq!(previous.len(), N);
        }
    }
}

#[test]
fn fused_masks_cover_their_parts() {
    let index = build(IndexParams::default().with_curve_scales(vec![2, 3, 4]));
    let mut rng = StdRng::seed_from_u64(0);
    let masks: Vec<CurveMask> = every_mask().filter(|m| !m.is_empty()).collect();

    for id in (0..N as u32).step_by(29) {
        for &m1 in &masks {
            for &m2 in &masks {
                let a = index.candidates(id, m1, 3, 10, &mut rng).unwrap();
                let b = index.candidates(id, m2, 3, 10, &mut rng).unwrap();
                let fused = index.candidates(id, m1 | m2, 3, 10, &mut rng).unwrap();

                let union: HashSet<u32> = a.iter().chain(b.iter()).collect();
                assert!(union.iter().all(|&x| fused.contains(x)));
                assert!(fused.is_superset(&a) && fused.is_superset(&b));
            }
        }
    }
}

// =============================================================================
// Re-ranking
// =============================================================================

#[test]
fn ranked_result_matches_sorted_scan() {
    for metric in [DistanceMetric::L1, DistanceMetric::L2, DistanceMetric::Cosine] {
        let index = build(
            IndexParams::default()
                .with_default_scale(5)
                .with_fallback_scale(5)
                .with_metric(metric),
        );
        let mut rng = StdRng::seed_from_u64(5);
        for id in (0..N as u32).step_by(7) {
            for mask in every_mask() {
                for k in [1, 5, 20, 101] {
                    let cands = index.candidates(id, mask, 2, k, &mut rng.clone()).unwrap();
                    let result = index.query(id, mask, 2, k, &mut rng.clone()).unwrap();
                    let query = index.dataset().vector(id).unwrap();
                    let expected = brute_force_top_k(&cands, index.dataset(), &metric, query, k);

                    assert_eq!(result.len(), k.min(cands.len()));
                    assert_eq!(result.to_pairs(), expected, "metric={metric:?} id={id} k={k}");
                    assert!(result
                        .neighbors()
                        .windows(2)
                        .all(|w| w[0].distance <= w[1].distance));
                }
                rng.random::<u64>();
            }
        }
    }
}

#[test]
fn whole_curve_window_gives_exact_knn() {
    let index = build(IndexParams::default());
    let k = 15;
    for id in (0..N as u32).step_by(31) {
        let result = index
            .query_seeded(id, CurveMask::single(1), N, k, 0)
            .unwrap();
        assert_eq!(result.candidates_examined(), N);

        let query = index.dataset().vector(id).unwrap();
        let mut exact: Vec<(u32, f32)> = index
            .dataset()
            .iter()
            .map(|(other, v)| (other, DistanceMetric::L1.distance(query, v)))
            .collect();
        exact.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        exact.truncate(k);
        assert_eq!(result.to_pairs(), exact);
        assert_eq!(result.neighbors()[0].id, id);
    }
}

#[test]
fn fused_curves_recall_more_than_one() {
    let index = build(IndexParams::default().with_default_scale(5));
    let k = 10;
    let mut single_hits = 0usize;
    let mut fused_hits = 0usize;

    for id in 0..N as u32 {
        let query = index.dataset().vector(id).unwrap();
        let mut exact: Vec<(u32, f32)> = index
            .dataset()
            .iter()
            .map(|(other, v)| (other, DistanceMetric::L1.distance(query, v)))
            .collect();
        exact.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        let truth: HashSet<u32> = exact.iter().take(k).map(|(i, _)| *i).collect();

        let single = index.query_seeded(id, CurveMask::single(0), 2, k, 0).unwrap();
        let fused = index
            .query_seeded(id, CurveMask::all(CURVES).unwrap(), 2, k, 0)
            .unwrap();
        single_hits += single.ids().iter().filter(|i| truth.contains(i)).count();
        fused_hits += fused.ids().iter().filter(|i| truth.contains(i)).count();
    }

    // The fused pool is a superset of the single-curve pool, so its top-k
    // can only contain more true neighbors.
    assert!(fused_hits >= single_hits, "{fused_hits} < {single_hits}");
}

// =============================================================================
// Random fallback
// =============================================================================

#[test]
fn fallback_sample_size() {
    let index = build(IndexParams::default().with_fallback_scale(25));
    let mut rng = StdRng::seed_from_u64(99);
    for unit in [0, 1, 2, 4, 10] {
        for k in [1, 10, 101, 1000] {
            let s = index.fallback_sample_size(k, unit);
            assert_eq!(s, k.min(2 * unit * 25));
            for id in [0, 200, 399] {
                let cands = index.candidates(id, CurveMask::empty(), unit, k, &mut rng).unwrap();
                let drawn = s.min(N);
                assert!(
                    cands.len() == drawn || cands.len() == drawn + 1,
                    "len={} drawn={drawn}",
                    cands.len()
                );
                assert!(cands.len() <= N);
                assert!(cands.contains(id));
            }
        }
    }
}

#[test]
fn fallback_is_deterministic_for_a_seed() {
    let index = build(IndexParams::default().with_fallback_scale(10));
    for id in [3, 150, 398] {
        let a = index
            .candidates(id, CurveMask::empty(), 3, 50, &mut StdRng::seed_from_u64(123))
            .unwrap();
        let b = index
            .candidates(id, CurveMask::empty(), 3, 50, &mut StdRng::seed_from_u64(123))
            .unwrap();
        assert_eq!(a, b);

        let ra = index.query_seeded(id, CurveMask::empty(), 3, 20, 7).unwrap();
        let rb = index.query_seeded(id, CurveMask::empty(), 3, 20, 7).unwrap();
        assert_eq!(ra, rb);
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn batch_matches_sequential_queries() {
    let index = build(IndexParams::default().with_default_scale(4).with_fallback_scale(4));
    let ids: Vec<u32> = (0..N as u32).rev().collect();

    for mask in [CurveMask::empty(), CurveMask::single(2), CurveMask::all(CURVES).unwrap()] {
        let batch = index.query_batch(&ids, mask, 3, 10, 2024).unwrap();
        let again = index.query_batch(&ids, mask, 3, 10, 2024).unwrap();
        assert_eq!(batch, again);

        for (&id, result) in ids.iter().zip(&batch) {
            assert_eq!(result, &index.query_seeded(id, mask, 3, 10, 2024).unwrap());
        }
    }
}

#[test]
fn index_is_shared_across_threads() {
    let index = build(IndexParams::default().with_default_scale(3));
    let mask = CurveMask::from_bits(0b101);
    let expected = index
        .query_batch(&(0..N as u32).collect::<Vec<_>>(), mask, 2, 8, 1)
        .unwrap();

    std::thread::scope(|s| {
        for t in 0..4u32 {
            let index = &index;
            let expected = &expected;
            s.spawn(move || {
                for id in (t..N as u32).step_by(4) {
                    let result = index.query_seeded(id, mask, 2, 8, 1).unwrap();
                    assert_eq!(&result, &expected[id as usize]);
                }
            });
        }
    });
}

#[test]
fn batch_surfaces_the_first_error() {
    let index = build(IndexParams::default());
    let err = index
        .query_batch(&[0, 1, N as u32], CurveMask::single(0), 1, 5, 0)
        .unwrap_err();
    assert_eq!(err, KnnError::UnknownObject(N as u32));
}
