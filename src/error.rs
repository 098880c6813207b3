//! Error types shared by the index, retrieval and tracking layers.

use std::path::PathBuf;
use thiserror::Error;

use crate::dataset::PatchDescriptor;
use crate::slide::SlideError;

pub type Result<T> = std::result::Result<T, PatchkitError>;

#[derive(Debug, Error)]
pub enum PatchkitError {
    /// Malformed or empty index, or a config document missing required keys.
    #[error("configuration error in {}: {msg}", path.display())]
    Configuration { path: PathBuf, msg: String },

    #[error("patch index {index} out of range (dataset has {len} patches)")]
    IndexOutOfRange { index: i64, len: usize },

    /// A single patch could not be read. Carries the failing descriptor so
    /// batched consumers can skip and log it.
    #[error("failed to retrieve {descriptor}: {source}")]
    Retrieval {
        descriptor: PatchDescriptor,
        #[source]
        source: SlideError,
    },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload to {uri} failed: {msg}")]
    Upload { uri: String, msg: String },

    #[error("blocking task failed: {0}")]
    Task(String),
}

impl PatchkitError {
    pub(crate) fn config(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        PatchkitError::Configuration {
            path: path.into(),
            msg: msg.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PatchkitError::Io {
            path: path.into(),
            source,
        }
    }
}
