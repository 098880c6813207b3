//! Gzip tar archives of run directories

use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::Path;

use crate::error::{PatchkitError, Result};

/// Archive `dir` into a gzip tar at `output`
///
/// The archive holds a single top-level entry named after the directory,
/// so `runs/<id>/meta.json` lands at `<id>/meta.json`.
pub fn archive_dir(dir: &Path, output: &Path) -> Result<()> {
    let name = dir
        .file_name()
        .ok_or_else(|| PatchkitError::config(dir, "cannot archive a path without a file name"))?;

    let file = File::create(output).map_err(|e| PatchkitError::io(output, e))?;
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    tar.append_dir_all(name, dir)
        .map_err(|e| PatchkitError::io(dir, e))?;

    let encoder = tar.into_inner().map_err(|e| PatchkitError::io(output, e))?;
    encoder.finish().map_err(|e| PatchkitError::io(output, e))?;
    Ok(())
}
