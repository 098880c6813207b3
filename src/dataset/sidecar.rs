//! Per-slide JSON index files
//!
//! ```json
//! { "slide_path": "/slides/a.tiff", "slide_level": 1,
//!   "patch_pos": [ {"x1": 0, "y1": 0, "x2": 224, "y2": 224}, {"patch_file": "a_0001.png"} ] }
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::descriptor::{PatchDescriptor, Region};
use crate::error::{PatchkitError, Result};

#[derive(Deserialize, Debug)]
struct SlideIndexFile {
    slide_path: Option<PathBuf>,
    slide_level: Option<u32>,
    patch_pos: Vec<PatchEntry>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum PatchEntry {
    File { patch_file: String },
    Bbox { x1: u32, y1: u32, x2: u32, y2: u32 },
}

/// Read one JSON index file into descriptors, in entry order.
///
/// Pre-cut patch files are resolved against `patches_dir`.
pub fn read_json_index(path: &Path, patches_dir: &Path) -> Result<Vec<PatchDescriptor>> {
    let raw = fs::read(path).map_err(|e| PatchkitError::config(path, format!("unreadable: {e}")))?;
    let slide: SlideIndexFile = serde_json::from_slice(&raw)
        .map_err(|e| PatchkitError::config(path, format!("malformed index: {e}")))?;

    let mut patches = Vec::with_capacity(slide.patch_pos.len());
    for (i, entry) in slide.patch_pos.into_iter().enumerate() {
        match entry {
            PatchEntry::File { patch_file } => {
                patches.push(PatchDescriptor::on_disk(patches_dir.join(patch_file)));
            }
            PatchEntry::Bbox { x1, y1, x2, y2 } => {
                let source_path = slide.slide_path.as_ref().ok_or_else(|| {
                    PatchkitError::config(path, "bounding-box patches need a slide_path")
                })?;
                let level = slide.slide_level.ok_or_else(|| {
                    PatchkitError::config(path, "bounding-box patches need a slide_level")
                })?;
                let region = Region::from_corners(x1, y1, x2, y2).ok_or_else(|| {
                    PatchkitError::config(
                        path,
                        format!("patch_pos[{i}] is empty: ({x1}, {y1}) -> ({x2}, {y2})"),
                    )
                })?;
                patches.push(PatchDescriptor::region(source_path.clone(), level, region));
            }
        }
    }

    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_mixed_entries_keep_order() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "slide.json",
            r#"{"slide_path": "/slides/s.tiff", "slide_level": 1,
                "patch_pos": [{"x1": 5, "y1": 6, "x2": 15, "y2": 26}, {"patch_file": "p.png"}]}"#,
        );

        let patches = read_json_index(&path, dir.path()).unwrap();
        assert_eq!(patches.len(), 2);
        assert_eq!(
            patches[0],
            PatchDescriptor::region("/slides/s.tiff", 1, Region::new(5, 6, 10, 20))
        );
        assert_eq!(patches[1], PatchDescriptor::on_disk(dir.path().join("p.png")));
    }

    #[test]
    fn test_patch_files_without_slide_keys() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "s.json", r#"{"patch_pos": [{"patch_file": "a.png"}]}"#);
        assert_eq!(read_json_index(&path, dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_patch_pos_is_configuration_error() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "s.json", r#"{"slide_path": "a", "slide_level": 0}"#);
        let err = read_json_index(&path, dir.path()).unwrap_err();
        assert!(matches!(err, PatchkitError::Configuration { .. }));
    }

    #[test]
    fn test_bbox_without_slide_path_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "s.json",
            r#"{"slide_level": 0, "patch_pos": [{"x1": 0, "y1": 0, "x2": 1, "y2": 1}]}"#,
        );
        let err = read_json_index(&path, dir.path()).unwrap_err();
        assert!(err.to_string().contains("slide_path"));
    }

    #[test]
    fn test_inverted_box_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write(
            dir.path(),
            "s.json",
            r#"{"slide_path": "a", "slide_level": 0,
                "patch_pos": [{"x1": 9, "y1": 0, "x2": 3, "y2": 4}]}"#,
        );
        let err = read_json_index(&path, dir.path()).unwrap_err();
        assert!(err.to_string().contains("patch_pos[0]"));
    }

    #[test]
    fn test_entry_with_unknown_shape_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write(dir.path(), "s.json", r#"{"patch_pos": [{"x1": 1}]}"#);
        assert!(matches!(
            read_json_index(&path, dir.path()),
            Err(PatchkitError::Configuration { .. })
        ));
    }
}
