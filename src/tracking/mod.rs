//! Run tracking
//!
//! This module handles:
//! - Creating a unique directory per training run
//! - Writing the run metadata summary
//! - Archiving the run and uploading the archive

pub mod archive;
pub mod meta;
pub mod store;
pub mod tracker;

pub use meta::RunMetadata;
pub use store::{ArtifactStore, S3ArtifactStore, UploadFailure};
pub use tracker::{FinalizeOutcome, RunTracker};
