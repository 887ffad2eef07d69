//! Convenience helpers for loading images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::ImageView;
use crate::util::{OrbFeatError, OrbFeatResult};
use std::path::Path;

/// Creates a borrowed view from a grayscale image buffer.
pub fn view_from_gray_image(img: &image::GrayImage) -> OrbFeatResult<ImageView<'_, u8>> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    ImageView::from_slice(img.as_raw(), width, height)
}

/// Loads an image from disk and converts it to grayscale.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> OrbFeatResult<image::GrayImage> {
    let img = image::open(path).map_err(|err| OrbFeatError::ImageIo {
        reason: err.to_string(),
    })?;
    Ok(img.to_luma8())
}
