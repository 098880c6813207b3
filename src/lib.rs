//! Patch datasets and run tracking for self-supervised training on
//! whole-slide pathology images.
//!
//! - [`dataset`]: per-slide index files flattened into a [`PatchIndex`]
//! - [`slide`]: turning descriptors into RGB pixels with a [`PatchRetriever`]
//! - [`tracking`]: run directories, metadata, archives and uploads
//! - [`config`]: layered experiment configuration

#![cfg_attr(not(test), deny(clippy::expect_used, clippy::unwrap_used))]

pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod slide;
pub mod tracking;

pub use dataset::{
    DatasetSummary, IndexFormat, IndexOptions, PatchDataset, PatchDescriptor, PatchIndex, Region,
};
pub use error::{PatchkitError, Result};
pub use slide::{PatchRetriever, SlideError, SlideReader, TiffPyramidReader};
pub use tracking::{ArtifactStore, FinalizeOutcome, RunTracker, S3ArtifactStore, UploadFailure};
