//! ORB (Oriented FAST + rotated BRIEF) keypoint and descriptor
//! extraction for single-channel 8-bit images.
//!
//! The crate builds a bordered scale pyramid, detects FAST-9/16 corners
//! tile by tile with an adaptive threshold fallback, thins the candidates
//! with a configurable spatial distribution strategy, assigns
//! intensity-centroid orientations, and packs one 256-bit steered-BRIEF
//! descriptor per surviving keypoint. Keypoints come back in base-image
//! coordinates; see [`OrbExtractor`].

mod descriptor;
mod detect;
mod distribute;
mod image;
mod keypoint;
mod orient;
mod trace;
mod util;

pub mod extract;

pub use crate::descriptor::{Descriptors, DESCRIPTOR_BYTES, PATCH_SIZE};
pub use crate::detect::{ScoreType, CIRCLE_SIZE};
pub use crate::distribute::{distribute_keypoints, Bounds, Distribution};
pub use crate::extract::{Extraction, ExtractorConfig, OrbExtractor};
pub use crate::image::pyramid::EDGE_THRESHOLD;
pub use crate::image::ImageView;
pub use crate::keypoint::{FloatPoint, KeyPoint, Point};
pub use crate::orient::HALF_PATCH_SIZE;
pub use crate::util::error::{OrbFeatError, OrbFeatResult};

#[cfg(feature = "image-io")]
pub use crate::image::io::{load_gray_image, view_from_gray_image};
