//! Suppression via Square Covering.
//!
//! Binary-searches a suppression radius `r` so that a greedy pass over the
//! response-sorted candidates (a candidate survives iff no already-kept
//! keypoint lies within `r` of it in Chebyshev distance) retains a count
//! inside `[n - tol, n + tol]`. The greedy pass buckets kept keypoints in
//! a grid of cell size `r`, so only the 3x3 cell neighbourhood is probed
//! per candidate.

use super::{sort_by_response_desc, Bounds};
use crate::keypoint::KeyPoint;

pub(crate) fn distribute_ssc(kpts: &mut Vec<KeyPoint>, bounds: Bounds, n: usize, tol: i32) {
    let width = bounds.width().max(1);
    let height = bounds.height().max(1);

    sort_by_response_desc(kpts);

    let mut low = 1i32;
    let mut high = width.max(height);
    let mut best: Option<Vec<KeyPoint>> = None;
    let mut best_gap = i64::MAX;

    while low <= high {
        let radius = low + (high - low) / 2;
        let kept = greedy_cover(kpts, radius, width, height, bounds);
        let gap = (kept.len() as i64 - n as i64).abs();
        if gap < best_gap {
            best_gap = gap;
            best = Some(kept.clone());
        }
        if gap <= tol as i64 {
            break;
        }
        if kept.len() > n {
            low = radius + 1;
        } else {
            high = radius - 1;
        }
    }

    if let Some(kept) = best {
        *kpts = kept;
    }
}

/// One greedy covering pass at a fixed radius. `kpts` must already be
/// sorted by descending response.
fn greedy_cover(
    kpts: &[KeyPoint],
    radius: i32,
    width: i32,
    height: i32,
    bounds: Bounds,
) -> Vec<KeyPoint> {
    let cell = radius as f32;
    let ncx = (width / radius + 2) as usize;
    let ncy = (height / radius + 2) as usize;
    let mut buckets: Vec<Vec<(f32, f32)>> = vec![Vec::new(); ncx * ncy];
    let mut kept = Vec::new();

    for kpt in kpts {
        let rx = kpt.pt.x - bounds.min_x as f32;
        let ry = kpt.pt.y - bounds.min_y as f32;
        let cx = ((rx / cell).max(0.0) as usize).min(ncx - 1);
        let cy = ((ry / cell).max(0.0) as usize).min(ncy - 1);

        let mut covered = false;
        'probe: for ny in cy.saturating_sub(1)..=(cy + 1).min(ncy - 1) {
            for nx in cx.saturating_sub(1)..=(cx + 1).min(ncx - 1) {
                for &(kx, ky) in &buckets[ny * ncx + nx] {
                    if (rx - kx).abs() <= cell && (ry - ky).abs() <= cell {
                        covered = true;
                        break 'probe;
                    }
                }
            }
        }
        if !covered {
            buckets[cy * ncx + cx].push((rx, ry));
            kept.push(*kpt);
        }
    }
    kept
}
