//! Space-Filling Curve kNN Demo
//!
//! Builds three shifted Z-order curves over random 2-d points, then compares
//! one curve, all three fused, and the random baseline by recall@k and by the
//! number of distance computations each needs.
//!
//! ```bash
//! RUST_LOG=curvenn=debug cargo run --example curve_knn_demo --release
//! ```

use std::collections::HashSet;

use curvenn::{
    ApproximateKnnIndex, CountingDistance, CurveMask, Dataset, Distance, DistanceMetric,
    IndexParams,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N: usize = 5_000;
const K: usize = 20;

type Key = Box<dyn Fn(&[f32]) -> u64 + Send + Sync>;

fn main() -> curvenn::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Space-Filling Curve kNN");
    println!("=======================\n");

    let mut rng = StdRng::seed_from_u64(0);
    let rows: Vec<[f32; 2]> = (0..N).map(|_| [rng.random(), rng.random()]).collect();
    let dataset = Dataset::from_rows(&rows)?;

    let keys: Vec<Key> = [(0.0_f32, 0.0_f32), (0.37, 0.21), (0.71, 0.53)]
        .into_iter()
        .map(|(dx, dy)| -> Key {
            Box::new(move |v: &[f32]| z_order(v[0] + dx, v[1] + dy))
        })
        .collect();

    let params = IndexParams::default()
        .with_default_scale(K / 2)
        .with_fallback_scale(K / 2);
    let index = ApproximateKnnIndex::build(dataset, &keys, params)?
        .with_distance(CountingDistance::new(DistanceMetric::L1));

    let truth = exact_neighbors(&index);

    let configs = [
        ("z (one curve)", CurveMask::single(0)),
        ("z x3 (fused)", CurveMask::all(3)?),
        ("random", CurveMask::empty()),
    ];

    println!("   {:<16} {:>5} {:>10} {:>12}", "curves", "unit", "recall@k", "dist/query");
    for (name, mask) in configs {
        for unit in [1, 2, 4, 8] {
            index.distance().reset();
            let ids: Vec<u32> = (0..N as u32).collect();
            let results = index.query_batch(&ids, mask, unit, K, 42)?;

            let hits: usize = results
                .iter()
                .zip(&truth)
                .map(|(r, t)| r.iter().filter(|n| t.contains(&n.id)).count())
                .sum();
            let recall = hits as f64 / (N * K) as f64;
            // Self-distance is computed too; the per-query cost excludes it.
            let distances = index.distance().count() as f64 / N as f64 - 1.0;

            println!("   {name:<16} {unit:>5} {recall:>10.3} {distances:>12.1}");
        }
    }

    Ok(())
}

fn z_order(x: f32, y: f32) -> u64 {
    let qx = (x.rem_euclid(1.0) * 65535.0) as u64;
    let qy = (y.rem_euclid(1.0) * 65535.0) as u64;
    (0..16).fold(0, |key, bit| {
        key | ((qx >> bit) & 1) << (2 * bit) | ((qy >> bit) & 1) << (2 * bit + 1)
    })
}

/// True k nearest neighbors of every object by full scan.
fn exact_neighbors<D: Distance>(index: &ApproximateKnnIndex<D>) -> Vec<HashSet<u32>> {
    let dataset = index.dataset();
    dataset
        .iter()
        .map(|(_, q)| {
            let mut all: Vec<(f32, u32)> = dataset
                .iter()
                .map(|(id, v)| (DistanceMetric::L1.distance(q, v), id))
                .collect();
            all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            all.into_iter().take(K).map(|(_, id)| id).collect()
        })
        .collect()
}
