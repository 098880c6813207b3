//! Patch retriever
//!
//! Resolves a patch descriptor to 8-bit RGB pixels. Every call opens and
//! releases its own file handles; nothing is cached. Opening a large
//! slide per request is the dominant cost, and requests are not grouped
//! by slide here.

use image::RgbImage;
use tokio::task;

use super::{SlideError, SlideReader, TiffPyramidReader};
use crate::dataset::PatchDescriptor;
use crate::error::{PatchkitError, Result};

/// Fetches patch pixels for either descriptor shape
#[derive(Debug, Clone, Default)]
pub struct PatchRetriever<R = TiffPyramidReader> {
    slides: R,
}

impl PatchRetriever<TiffPyramidReader> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<R: SlideReader> PatchRetriever<R> {
    /// Use a different slide backend for region descriptors
    pub fn with_reader(slides: R) -> Self {
        Self { slides }
    }

    pub fn reader(&self) -> &R {
        &self.slides
    }

    /// Decode one patch
    ///
    /// On failure the error names the descriptor; the caller decides
    /// whether to skip the patch or abort.
    pub fn fetch(&self, descriptor: &PatchDescriptor) -> Result<RgbImage> {
        self.fetch_inner(descriptor)
            .map_err(|source| PatchkitError::Retrieval {
                descriptor: descriptor.clone(),
                source,
            })
    }

    fn fetch_inner(
        &self,
        descriptor: &PatchDescriptor,
    ) -> std::result::Result<RgbImage, SlideError> {
        match descriptor {
            PatchDescriptor::OnDisk { patch_path } => Ok(image::open(patch_path)?.to_rgb8()),
            PatchDescriptor::Region {
                source_path,
                level,
                region,
            } => self.slides.read_region(source_path, *level, *region),
        }
    }
}

impl<R: SlideReader + Clone + 'static> PatchRetriever<R> {
    /// Decode one patch on the blocking pool
    pub async fn fetch_async(&self, descriptor: PatchDescriptor) -> Result<RgbImage> {
        // Spawn blocking because slide decoding is CPU-intensive
        let retriever = self.clone();
        task::spawn_blocking(move || retriever.fetch(&descriptor))
            .await
            .map_err(|e| PatchkitError::Task(format!("patch fetch join error: {e}")))?
    }
}
