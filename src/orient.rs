//! Intensity-centroid orientation.
//!
//! The dominant angle of a keypoint is the direction of the first image
//! moment over a disk of radius `HALF_PATCH_SIZE` around it. The disk is
//! walked row by row using precomputed half-widths, accumulating `m10`
//! from the central row and symmetric row pairs, and `m01` from the
//! up/down asymmetry.

use crate::image::pyramid::BorderedLevel;
use crate::keypoint::KeyPoint;
use crate::util::math::{rad_to_deg_0_360, round_coord};

/// Radius of the orientation disk.
pub const HALF_PATCH_SIZE: usize = 15;

/// Half-width of each disk row for `y` in `[0, HALF_PATCH_SIZE]`.
pub(crate) const CIRCULAR_ROWS: [i32; HALF_PATCH_SIZE + 1] =
    [15, 15, 15, 15, 14, 14, 14, 13, 13, 12, 11, 10, 9, 8, 6, 3];

/// Intensity-centroid angle at interior coordinate `(x, y)`, in degrees
/// in `[0, 360)`.
///
/// The disk must fit inside the level interior plus its guaranteed
/// border; the tile policy keeps detected keypoints far enough from the
/// edge.
pub(crate) fn intensity_centroid_angle(level: &BorderedLevel, x: i32, y: i32) -> f32 {
    let r = HALF_PATCH_SIZE as i32;
    let mut m10: i32 = 0;
    let mut m01: i32 = 0;

    for dx in -r..=r {
        m10 += dx * level.at(x + dx, y) as i32;
    }

    for dy in 1..=r {
        let half = CIRCULAR_ROWS[dy as usize];
        let mut row_sum = 0;
        for dx in -half..=half {
            let upper = level.at(x + dx, y - dy) as i32;
            let lower = level.at(x + dx, y + dy) as i32;
            row_sum += lower - upper;
            m10 += dx * (lower + upper);
        }
        m01 += dy * row_sum;
    }

    rad_to_deg_0_360((m01 as f32).atan2(m10 as f32))
}

/// Annotates every keypoint of one level with its dominant angle.
///
/// Keypoint coordinates must be in the level frame.
pub(crate) fn compute_angles(level: &BorderedLevel, kpts: &mut [KeyPoint]) {
    for kpt in kpts {
        kpt.angle = intensity_centroid_angle(level, round_coord(kpt.pt.x), round_coord(kpt.pt.y));
    }
}
