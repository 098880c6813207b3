//! Patch datasets
//!
//! This module handles:
//! - Parsing per-slide index files (JSON or parquet sidecars)
//! - Flattening them into one randomly addressable patch index
//! - Pairing the index with a retriever and an optional transform

pub mod descriptor;
pub mod index;
pub mod sidecar;
pub mod tabular;

use image::RgbImage;

use crate::error::Result;
use crate::slide::{PatchRetriever, SlideReader, TiffPyramidReader};

pub use descriptor::{DatasetSummary, PatchDescriptor, Region};
pub use index::{IndexFormat, IndexOptions, PatchIndex};

type Transform<T> = Box<dyn Fn(RgbImage) -> T + Send + Sync>;

/// An index plus the means to turn its entries into samples
///
/// `get(i)` fetches patch `i` and runs the transform over it. Without a
/// transform the decoded RGB image is returned as is.
pub struct PatchDataset<T = RgbImage, R = TiffPyramidReader> {
    index: PatchIndex,
    retriever: PatchRetriever<R>,
    transform: Transform<T>,
}

impl PatchDataset<RgbImage, TiffPyramidReader> {
    pub fn new(index: PatchIndex) -> Self {
        Self::with_retriever(index, PatchRetriever::new())
    }
}

impl<R: SlideReader> PatchDataset<RgbImage, R> {
    pub fn with_retriever(index: PatchIndex, retriever: PatchRetriever<R>) -> Self {
        Self {
            index,
            retriever,
            transform: Box::new(|image| image),
        }
    }
}

impl<T, R: SlideReader> PatchDataset<T, R> {
    /// Replace the transform applied to every fetched patch
    pub fn with_transform<U, F>(self, transform: F) -> PatchDataset<U, R>
    where
        F: Fn(RgbImage) -> U + Send + Sync + 'static,
    {
        PatchDataset {
            index: self.index,
            retriever: self.retriever,
            transform: Box::new(transform),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<T> {
        let descriptor = self.index.get(index)?;
        let image = self.retriever.fetch(descriptor)?;
        Ok((self.transform)(image))
    }

    pub fn index(&self) -> &PatchIndex {
        &self.index
    }

    pub fn retriever(&self) -> &PatchRetriever<R> {
        &self.retriever
    }

    pub fn summary(&self) -> DatasetSummary {
        self.index.summary()
    }
}
