//! Steered-BRIEF (rBRIEF) descriptor computation.
//!
//! Each keypoint yields 256 brightness comparisons between pattern point
//! pairs rotated by the keypoint angle, sampled from a Gaussian-blurred
//! copy of the keypoint's pyramid level and packed into 32 bytes.

use crate::image::blur::gaussian_blur_7x7;
use crate::image::pyramid::ScalePyramid;
use crate::keypoint::KeyPoint;
use crate::util::math::round_coord;

pub(crate) mod pattern;

use pattern::BRIEF_PATTERN;

/// Diameter of the descriptor sampling patch in pixels.
pub const PATCH_SIZE: usize = 31;

/// Bytes per descriptor row.
pub const DESCRIPTOR_BYTES: usize = 32;

/// Packed binary descriptors, one 32-byte row per keypoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Descriptors {
    data: Vec<u8>,
    rows: usize,
}

impl Descriptors {
    fn with_rows(rows: usize) -> Self {
        Self {
            data: vec![0; rows * DESCRIPTOR_BYTES],
            rows,
        }
    }

    /// Number of descriptor rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// The 32-byte descriptor of keypoint `k`.
    pub fn row(&self, k: usize) -> &[u8] {
        &self.data[k * DESCRIPTOR_BYTES..(k + 1) * DESCRIPTOR_BYTES]
    }

    /// All rows as one contiguous byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn row_mut(&mut self, k: usize) -> &mut [u8] {
        &mut self.data[k * DESCRIPTOR_BYTES..(k + 1) * DESCRIPTOR_BYTES]
    }
}

/// Computes descriptors for keypoints grouped by level, in level-frame
/// coordinates, concatenating rows in ascending level order.
pub(crate) fn compute_descriptors(
    pyramid: &ScalePyramid,
    keypoints_per_level: &[Vec<KeyPoint>],
) -> Descriptors {
    let total: usize = keypoints_per_level.iter().map(Vec::len).sum();
    let mut descriptors = Descriptors::with_rows(total);

    let mut current = 0;
    for (lvl, kpts) in keypoints_per_level.iter().enumerate() {
        if kpts.is_empty() {
            continue;
        }
        let level = pyramid.level(lvl);
        let blurred = gaussian_blur_7x7(level);
        let cols = level.cols() as i32;
        for kpt in kpts {
            describe(
                &blurred,
                cols,
                round_coord(kpt.pt.x),
                round_coord(kpt.pt.y),
                kpt.angle,
                descriptors.row_mut(current),
            );
            current += 1;
        }
    }
    descriptors
}

/// One 256-bit descriptor: bit `i` of byte `i / 8` (position `i % 8`) is
/// set iff the first sample of pair `i` is darker than the second.
fn describe(blurred: &[u8], cols: i32, x: i32, y: i32, angle_deg: f32, out: &mut [u8]) {
    let angle = angle_deg.to_radians();
    let a = angle.cos();
    let b = angle.sin();
    let base = y * cols + x;

    for i in 0..DESCRIPTOR_BYTES * 8 {
        let p0 = BRIEF_PATTERN[2 * i];
        let p1 = BRIEF_PATTERN[2 * i + 1];
        let v0 = blurred[(base + rotated_offset(p0, a, b, cols)) as usize];
        let v1 = blurred[(base + rotated_offset(p1, a, b, cols)) as usize];
        out[i / 8] |= u8::from(v0 < v1) << (i % 8);
    }
}

#[inline]
fn rotated_offset(p: (i8, i8), a: f32, b: f32, cols: i32) -> i32 {
    let px = p.0 as f32;
    let py = p.1 as f32;
    round_coord(px * a - py * b) + round_coord(px * b + py * a) * cols
}
