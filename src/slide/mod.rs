//! Patch pixel retrieval
//!
//! This module handles:
//! - Decoding pre-cut patch files
//! - Cropping regions out of multi-resolution slides
//! - The reader seam for other slide backends

pub mod pyramid;
pub mod retriever;

use image::RgbImage;
use std::path::Path;
use thiserror::Error;

use crate::dataset::Region;

pub use pyramid::TiffPyramidReader;
pub use retriever::PatchRetriever;

#[derive(Debug, Error)]
pub enum SlideError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("tiff decode failed: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("level {level} not available (slide has {available} levels)")]
    UnsupportedLevel { level: u32, available: u32 },
    #[error("region {region} outside the {width}x{height} level extent")]
    OutOfBounds {
        region: Region,
        width: u32,
        height: u32,
    },
    #[error("unsupported color type {0}")]
    UnsupportedColor(String),
}

/// Reads a region of a multi-resolution slide at one level
///
/// Implementations open the slide per call and release it before
/// returning; no state is shared between reads.
pub trait SlideReader: Send + Sync {
    fn read_region(&self, path: &Path, level: u32, region: Region) -> Result<RgbImage, SlideError>;
}
