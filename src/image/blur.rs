//! Separable Gaussian smoothing used before descriptor sampling.

use crate::image::pyramid::{reflect_101, BorderedLevel};

const KERNEL_RADIUS: i32 = 3;
const SIGMA: f32 = 2.0;

fn kernel() -> [f32; 7] {
    let mut k = [0.0f32; 7];
    let mut sum = 0.0;
    for (i, slot) in k.iter_mut().enumerate() {
        let d = i as f32 - KERNEL_RADIUS as f32;
        *slot = (-d * d / (2.0 * SIGMA * SIGMA)).exp();
        sum += *slot;
    }
    for slot in &mut k {
        *slot /= sum;
    }
    k
}

/// Blurs a level's interior with a 7x7 Gaussian (sigma 2) into a fresh
/// contiguous buffer of `cols * rows` bytes. Samples past the interior edge
/// are taken by reflect-101.
pub(crate) fn gaussian_blur_7x7(level: &BorderedLevel) -> Vec<u8> {
    let cols = level.cols();
    let rows = level.rows();
    let k = kernel();

    let mut horizontal = vec![0.0f32; cols * rows];
    for y in 0..rows {
        let row = level.interior_row(y);
        for x in 0..cols {
            let mut acc = 0.0;
            for (i, &w) in k.iter().enumerate() {
                let sx = reflect_101(x as i32 + i as i32 - KERNEL_RADIUS, cols as i32);
                acc += w * row[sx as usize] as f32;
            }
            horizontal[y * cols + x] = acc;
        }
    }

    let mut out = vec![0u8; cols * rows];
    for y in 0..rows {
        for x in 0..cols {
            let mut acc = 0.0;
            for (i, &w) in k.iter().enumerate() {
                let sy = reflect_101(y as i32 + i as i32 - KERNEL_RADIUS, rows as i32);
                acc += w * horizontal[sy as usize * cols + x];
            }
            out[y * cols + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{gaussian_blur_7x7, kernel};
    use crate::image::pyramid::ScalePyramid;
    use crate::image::ImageView;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let k = kernel();
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        for i in 0..3 {
            assert!((k[i] - k[6 - i]).abs() < 1e-6);
        }
        assert!(k[3] > k[2] && k[2] > k[1] && k[1] > k[0]);
    }

    #[test]
    fn uniform_image_is_unchanged() {
        let (w, h) = (40, 36);
        let data = vec![88u8; w * h];
        let mut pyr = ScalePyramid::new();
        pyr.build(ImageView::from_slice(&data, w, h).unwrap(), &[1.0]);
        let blurred = gaussian_blur_7x7(pyr.level(0));
        assert!(blurred.iter().all(|&v| v == 88));
    }

    #[test]
    fn linear_ramp_is_preserved_away_from_edges() {
        // A symmetric normalized kernel maps x -> x on a linear ramp.
        let (w, h) = (48, 36);
        let mut data = vec![0u8; w * h];
        for y in 0..h {
            for x in 0..w {
                data[y * w + x] = (x * 4) as u8;
            }
        }
        let mut pyr = ScalePyramid::new();
        pyr.build(ImageView::from_slice(&data, w, h).unwrap(), &[1.0]);
        let blurred = gaussian_blur_7x7(pyr.level(0));
        for y in 4..h - 4 {
            for x in 4..w - 4 {
                assert_eq!(blurred[y * w + x], (x * 4) as u8, "at ({x}, {y})");
            }
        }
    }

    #[test]
    fn impulse_spreads_symmetrically() {
        let (w, h) = (31, 31);
        let mut data = vec![0u8; w * h];
        data[15 * w + 15] = 255;
        let mut pyr = ScalePyramid::new();
        pyr.build(ImageView::from_slice(&data, w, h).unwrap(), &[1.0]);
        let blurred = gaussian_blur_7x7(pyr.level(0));
        assert!(blurred[15 * w + 15] > blurred[15 * w + 16]);
        assert_eq!(blurred[15 * w + 14], blurred[15 * w + 16]);
        assert_eq!(blurred[14 * w + 15], blurred[16 * w + 15]);
        assert_eq!(blurred[12 * w + 15], blurred[15 * w + 12]);
    }
}
