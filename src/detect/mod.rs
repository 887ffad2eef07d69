//! FAST-9/16 corner detection over pyramid level tiles.
//!
//! A pixel is a corner at threshold `t` iff at least 9 contiguous pixels of
//! its 16-pixel Bresenham ring (radius 3) are all brighter than `centre + t`
//! or all darker than `centre - t`. Candidates are pre-filtered through the
//! four cardinal ring pixels, scored (FAST or Harris), and thinned by 3x3
//! non-maximum suppression inside each detection tile.

use crate::image::pyramid::BorderedLevel;
use crate::keypoint::KeyPoint;

pub(crate) mod score;

use score::{fast_score, harris_score};

/// Number of pixels on the FAST Bresenham ring.
pub const CIRCLE_SIZE: usize = 16;

/// Ring offsets in clockwise order starting from 12 o'clock.
const RING: [(i32, i32); CIRCLE_SIZE] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Indices of the cardinal ring pixels used by the fast rejection test.
const CARDINALS: [usize; 4] = [0, 4, 8, 12];

/// Corner response measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoreType {
    /// Harris corner measure over a 7x7 gradient window.
    Harris,
    /// Largest threshold preserving the FAST contiguity test.
    Fast,
}

/// A detection window in level-interior coordinates.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TileRect {
    pub x0: i32,
    pub y0: i32,
    pub w: i32,
    pub h: i32,
}

/// FAST detector with per-level cached ring offsets.
pub(crate) struct FastDetector {
    score_type: ScoreType,
    offsets: Vec<[i32; CIRCLE_SIZE]>,
}

impl FastDetector {
    pub(crate) fn new(score_type: ScoreType) -> Self {
        Self {
            score_type,
            offsets: Vec::new(),
        }
    }

    pub(crate) fn score_type(&self) -> ScoreType {
        self.score_type
    }

    pub(crate) fn set_score_type(&mut self, score_type: ScoreType) {
        self.score_type = score_type;
    }

    /// Recomputes the per-level byte-offset tables for the ring positions.
    pub(crate) fn configure(&mut self, strides: &[usize]) {
        self.offsets = strides
            .iter()
            .map(|&stride| {
                let mut table = [0i32; CIRCLE_SIZE];
                for (slot, &(dx, dy)) in table.iter_mut().zip(RING.iter()) {
                    *slot = dx + dy * stride as i32;
                }
                table
            })
            .collect();
    }

    /// Detects corners inside `rect`, returning tile-local coordinates.
    ///
    /// The scan leaves a 3-pixel safety margin inside the tile so every
    /// ring read stays within the tile plus the level border.
    pub(crate) fn detect(
        &self,
        level: &BorderedLevel,
        rect: TileRect,
        threshold: u8,
        lvl: usize,
    ) -> Vec<KeyPoint> {
        let (w, h) = (rect.w, rect.h);
        if w < 7 || h < 7 {
            return Vec::new();
        }
        let offsets = &self.offsets[lvl];
        let data = level.data();
        let t = threshold as i32;

        let mut scores = vec![f32::NEG_INFINITY; (w * h) as usize];
        let mut corners: Vec<(i32, i32)> = Vec::new();

        for ly in 3..h - 3 {
            for lx in 3..w - 3 {
                let x = rect.x0 + lx;
                let y = rect.y0 + ly;
                let centre_idx = level.index(x, y);
                let centre = data[centre_idx] as i32;

                let mut brighter = 0;
                let mut darker = 0;
                for &k in &CARDINALS {
                    let p = ring_pixel(data, centre_idx, offsets[k]);
                    if p > centre + t {
                        brighter += 1;
                    } else if p < centre - t {
                        darker += 1;
                    }
                }
                if brighter < 3 && darker < 3 {
                    continue;
                }

                let mut d = [0i32; CIRCLE_SIZE];
                for (slot, &off) in d.iter_mut().zip(offsets.iter()) {
                    *slot = ring_pixel(data, centre_idx, off) - centre;
                }
                if !is_corner(&d, t) {
                    continue;
                }

                let response = match self.score_type {
                    ScoreType::Fast => fast_score(&d) as f32,
                    ScoreType::Harris => harris_score(level, x, y),
                };
                scores[(ly * w + lx) as usize] = response;
                corners.push((lx, ly));
            }
        }

        // 3x3 non-maximum suppression. Ties go to the first pixel in scan
        // order, so a flat response plateau still emits one corner.
        let mut out = Vec::with_capacity(corners.len());
        'corner: for &(lx, ly) in &corners {
            let response = scores[(ly * w + lx) as usize];
            for dy in -1..=1i32 {
                for dx in -1..=1i32 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = lx + dx;
                    let ny = ly + dy;
                    if nx < 0 || ny < 0 || nx >= w || ny >= h {
                        continue;
                    }
                    let neighbour = scores[(ny * w + nx) as usize];
                    let scanned_before = dy < 0 || (dy == 0 && dx < 0);
                    if neighbour > response || (scanned_before && neighbour == response) {
                        continue 'corner;
                    }
                }
            }
            out.push(KeyPoint::with_response(lx as f32, ly as f32, response));
        }
        out
    }
}

#[inline]
fn ring_pixel(data: &[u8], centre_idx: usize, offset: i32) -> i32 {
    data[(centre_idx as i64 + offset as i64) as usize] as i32
}

/// Full 16-ring contiguity test: 9 consecutive ring pixels all brighter
/// than `centre + t` or all darker than `centre - t`, wrapping allowed.
fn is_corner(d: &[i32; CIRCLE_SIZE], t: i32) -> bool {
    let mut bright_run = 0;
    let mut dark_run = 0;
    for k in 0..CIRCLE_SIZE + 8 {
        let diff = d[k % CIRCLE_SIZE];
        if diff > t {
            bright_run += 1;
            dark_run = 0;
            if bright_run >= 9 {
                return true;
            }
        } else if diff < -t {
            dark_run += 1;
            bright_run = 0;
            if dark_run >= 9 {
                return true;
            }
        } else {
            bright_run = 0;
            dark_run = 0;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::{is_corner, FastDetector, ScoreType, TileRect, CIRCLE_SIZE};
    use crate::image::pyramid::ScalePyramid;
    use crate::image::ImageView;

    #[test]
    fn is_corner_requires_nine_contiguous() {
        let mut d = [0i32; CIRCLE_SIZE];
        for slot in d.iter_mut().take(8) {
            *slot = 50;
        }
        assert!(!is_corner(&d, 20));
        d[8] = 50;
        assert!(is_corner(&d, 20));
    }

    #[test]
    fn is_corner_wraps_around_the_seam() {
        let mut d = [0i32; CIRCLE_SIZE];
        for k in 11..16 {
            d[k] = -60;
        }
        for slot in d.iter_mut().take(4) {
            *slot = -60;
        }
        assert!(is_corner(&d, 20));
    }

    #[test]
    fn alternating_ring_is_not_a_corner() {
        let mut d = [0i32; CIRCLE_SIZE];
        for (k, slot) in d.iter_mut().enumerate() {
            *slot = if k % 2 == 0 { 80 } else { -80 };
        }
        assert!(!is_corner(&d, 20));
    }

    fn detector_for(pyr: &ScalePyramid, score: ScoreType) -> FastDetector {
        let mut fast = FastDetector::new(score);
        fast.configure(&[pyr.level(0).stride()]);
        fast
    }

    #[test]
    fn uniform_tile_yields_no_corners() {
        let (w, h) = (64, 64);
        let data = vec![128u8; w * h];
        let mut pyr = ScalePyramid::new();
        pyr.build(ImageView::from_slice(&data, w, h).unwrap(), &[1.0]);
        let fast = detector_for(&pyr, ScoreType::Fast);
        let rect = TileRect {
            x0: 0,
            y0: 0,
            w: w as i32,
            h: h as i32,
        };
        assert!(fast.detect(pyr.level(0), rect, 20, 0).is_empty());
    }

    #[test]
    fn bright_block_yields_corner_near_its_centre() {
        let (w, h) = (64, 64);
        let mut data = vec![0u8; w * h];
        for y in 31..34 {
            for x in 31..34 {
                data[y * w + x] = 255;
            }
        }
        let mut pyr = ScalePyramid::new();
        pyr.build(ImageView::from_slice(&data, w, h).unwrap(), &[1.0]);
        let fast = detector_for(&pyr, ScoreType::Harris);
        let rect = TileRect {
            x0: 16,
            y0: 16,
            w: 32,
            h: 32,
        };
        let kpts = fast.detect(pyr.level(0), rect, 20, 0);
        assert!(!kpts.is_empty());
        assert!(kpts.iter().any(|k| {
            let x = k.pt.x + 16.0;
            let y = k.pt.y + 16.0;
            (x - 32.0).abs() <= 2.0 && (y - 32.0).abs() <= 2.0
        }));
    }

    #[test]
    fn raising_threshold_never_detects_more() {
        let (w, h) = (96, 96);
        let mut data = vec![0u8; w * h];
        // Deterministic speckle texture.
        for y in 0..h {
            for x in 0..w {
                data[y * w + x] = (((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF) as u8;
            }
        }
        let mut pyr = ScalePyramid::new();
        pyr.build(ImageView::from_slice(&data, w, h).unwrap(), &[1.0]);
        let fast = detector_for(&pyr, ScoreType::Fast);
        let rect = TileRect {
            x0: 0,
            y0: 0,
            w: w as i32,
            h: h as i32,
        };
        let low = fast.detect(pyr.level(0), rect, 10, 0).len();
        let mid = fast.detect(pyr.level(0), rect, 25, 0).len();
        let high = fast.detect(pyr.level(0), rect, 60, 0).len();
        assert!(low >= mid);
        assert!(mid >= high);
    }
}
