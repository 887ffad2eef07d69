//! Distributor invariants on synthetic candidate sets.

use orbfeat::{distribute_keypoints, Bounds, Distribution, FloatPoint, KeyPoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DOMAIN: i32 = 256;

fn keypoint(x: f32, y: f32, response: f32) -> KeyPoint {
    KeyPoint {
        pt: FloatPoint::new(x, y),
        size: 0.0,
        angle: -1.0,
        response,
        octave: 0,
    }
}

/// Candidates everywhere, with a strong cluster in the top-left corner
/// that a response-only selection would latch onto.
fn clustered_candidates(seed: u64) -> Vec<KeyPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut kpts = Vec::new();
    for _ in 0..1600 {
        let x = rng.random_range(0..DOMAIN) as f32;
        let y = rng.random_range(0..DOMAIN) as f32;
        let response = rng.random_range(1.0..100.0);
        kpts.push(keypoint(x, y, response));
    }
    for _ in 0..400 {
        let x = rng.random_range(0..DOMAIN / 4) as f32;
        let y = rng.random_range(0..DOMAIN / 4) as f32;
        let response = rng.random_range(100.0..200.0);
        kpts.push(keypoint(x, y, response));
    }
    kpts
}

fn bucket_variance(kpts: &[KeyPoint]) -> f32 {
    let mut counts = [0f32; 64];
    let cell = DOMAIN as f32 / 8.0;
    for kpt in kpts {
        let cx = ((kpt.pt.x / cell) as usize).min(7);
        let cy = ((kpt.pt.y / cell) as usize).min(7);
        counts[cy * 8 + cx] += 1.0;
    }
    let mean = counts.iter().sum::<f32>() / 64.0;
    counts.iter().map(|c| (c - mean) * (c - mean)).sum::<f32>() / 64.0
}

fn run(mode: Distribution, n: usize, tol: i32) -> Vec<KeyPoint> {
    let mut kpts = clustered_candidates(17);
    distribute_keypoints(
        mode,
        &mut kpts,
        Bounds::new(0, DOMAIN, 0, DOMAIN),
        n,
        tol,
    );
    kpts
}

#[test]
fn spatial_strategies_spread_more_evenly_than_naive() {
    let naive_var = bucket_variance(&run(Distribution::Naive, 100, 0));
    for mode in [
        Distribution::Grid,
        Distribution::Ssc,
        Distribution::QuadTree,
        Distribution::QuadTreeOrbSlamStyle,
    ] {
        let var = bucket_variance(&run(mode, 100, 10));
        assert!(
            var < naive_var,
            "{mode:?}: variance {var} not below naive {naive_var}"
        );
    }
}

#[test]
fn every_strategy_returns_a_subset_with_fields_intact() {
    let input = clustered_candidates(17);
    for mode in [
        Distribution::Naive,
        Distribution::Grid,
        Distribution::QuadTree,
        Distribution::QuadTreeOrbSlamStyle,
        Distribution::Ssc,
        Distribution::AnmsKdTree,
        Distribution::AnmsRangeTree,
    ] {
        let kpts = run(mode, 120, 10);
        assert!(!kpts.is_empty(), "{mode:?}");
        for kpt in &kpts {
            assert!(
                input.iter().any(|orig| orig == kpt),
                "{mode:?} synthesized or mutated a keypoint"
            );
        }
    }
}

#[test]
fn zero_tolerance_strategies_respect_n_exactly() {
    for mode in [
        Distribution::Naive,
        Distribution::Grid,
        Distribution::QuadTree,
        Distribution::QuadTreeOrbSlamStyle,
        Distribution::AnmsKdTree,
        Distribution::AnmsRangeTree,
    ] {
        for n in [1, 10, 137, 500] {
            let kpts = run(mode, n, 0);
            assert!(kpts.len() <= n, "{mode:?} n={n} got {}", kpts.len());
        }
    }
}

#[test]
fn ssc_count_stays_inside_the_soft_window() {
    for (n, tol) in [(100, 20), (300, 30)] {
        let kpts = run(Distribution::Ssc, n, tol);
        assert!(
            kpts.len() as i32 >= n as i32 - tol && kpts.len() as i32 <= n as i32 + tol,
            "n={n} tol={tol} got {}",
            kpts.len()
        );
    }
}

#[test]
fn naive_responses_dominate_ssc_minimum() {
    let naive = run(Distribution::Naive, 100, 0);
    let ssc = run(Distribution::Ssc, 100, 10);
    let naive_min = naive
        .iter()
        .map(|k| k.response)
        .fold(f32::INFINITY, f32::min);
    let ssc_min = ssc.iter().map(|k| k.response).fold(f32::INFINITY, f32::min);
    assert!(naive_min >= ssc_min);
}

#[test]
fn anms_variants_agree_and_keep_the_global_maximum() {
    let input = clustered_candidates(23);
    let strongest = input
        .iter()
        .cloned()
        .max_by(|a, b| a.response.partial_cmp(&b.response).unwrap())
        .unwrap();

    let mut kd = input.clone();
    let mut rt = input.clone();
    distribute_keypoints(
        Distribution::AnmsKdTree,
        &mut kd,
        Bounds::new(0, DOMAIN, 0, DOMAIN),
        80,
        0,
    );
    distribute_keypoints(
        Distribution::AnmsRangeTree,
        &mut rt,
        Bounds::new(0, DOMAIN, 0, DOMAIN),
        80,
        0,
    );

    assert_eq!(kd.len(), 80);
    assert_eq!(rt.len(), 80);
    assert!(kd.iter().any(|k| k == &strongest));
    assert!(rt.iter().any(|k| k == &strongest));

    let key = |k: &KeyPoint| (k.pt.x as i32, k.pt.y as i32, k.response as i32);
    let mut kd_keys: Vec<_> = kd.iter().map(key).collect();
    let mut rt_keys: Vec<_> = rt.iter().map(key).collect();
    kd_keys.sort_unstable();
    rt_keys.sort_unstable();
    assert_eq!(kd_keys, rt_keys);
}
