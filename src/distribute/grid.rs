//! Fixed-grid bucketing: one keypoint per cell.

use super::Bounds;
use crate::keypoint::KeyPoint;

/// Partitions the domain into a `sqrt(n) x sqrt(n)` grid and keeps the
/// single highest-response keypoint of each cell; empty cells contribute
/// nothing, so at most `n` keypoints survive.
pub(crate) fn distribute_grid(kpts: &mut Vec<KeyPoint>, bounds: Bounds, n: usize) {
    let cells = ((n as f32).sqrt().floor() as usize).max(1);
    let cell_w = bounds.width() as f32 / cells as f32;
    let cell_h = bounds.height() as f32 / cells as f32;

    let mut best: Vec<Option<usize>> = vec![None; cells * cells];
    for (i, kpt) in kpts.iter().enumerate() {
        let cx = (((kpt.pt.x - bounds.min_x as f32) / cell_w).max(0.0) as usize).min(cells - 1);
        let cy = (((kpt.pt.y - bounds.min_y as f32) / cell_h).max(0.0) as usize).min(cells - 1);
        let slot = &mut best[cy * cells + cx];
        match slot {
            Some(j) if kpts[*j].response >= kpt.response => {}
            _ => *slot = Some(i),
        }
    }

    let kept: Vec<KeyPoint> = best.into_iter().flatten().map(|i| kpts[i]).collect();
    *kpts = kept;
}
