//! Error types for orbfeat.

use thiserror::Error;

/// Result alias for orbfeat operations.
pub type OrbFeatResult<T> = std::result::Result<T, OrbFeatError>;

/// Errors that can occur when running orbfeat operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrbFeatError {
    /// The provided dimensions are invalid (must be non-zero).
    #[error("invalid dimensions: width={width} height={height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The provided stride is smaller than the image width.
    #[error("invalid stride: width={width} stride={stride}")]
    InvalidStride { width: usize, stride: usize },
    /// The backing buffer is too small for the requested view.
    #[error("buffer too small: needed={needed} got={got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// The base image cannot host the detection tile grid.
    #[error("image too small for extraction: width={width} height={height} min={min}")]
    ImageTooSmall {
        width: usize,
        height: usize,
        min: usize,
    },
    /// Failed to read an image through the `image` crate.
    #[cfg(feature = "image-io")]
    #[error("image io error: {reason}")]
    ImageIo { reason: String },
}
