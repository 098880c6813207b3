//! Shared data structures for the patch dataset
//!
//! These types flow from the index builders to the retriever and
//! into run metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A rectangle in slide pixel coordinates at a given resolution level
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a region from bounding-box corners.
    /// Returns `None` for empty or inverted boxes (`x2 <= x1` or `y2 <= y1`).
    pub fn from_corners(x1: u32, y1: u32, x2: u32, y2: u32) -> Option<Self> {
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self::new(x1, y1, x2 - x1, y2 - y1))
    }

    /// Whether the region lies within an image of the given extent
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x, self.y, self.width, self.height)
    }
}

/// One training patch
///
/// Either a pre-cut image file on disk, or a region of a whole-slide
/// image that is cropped on every read.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchDescriptor {
    OnDisk {
        patch_path: PathBuf,
    },
    Region {
        source_path: PathBuf,
        level: u32,
        region: Region,
    },
}

impl PatchDescriptor {
    pub fn on_disk(patch_path: impl Into<PathBuf>) -> Self {
        PatchDescriptor::OnDisk {
            patch_path: patch_path.into(),
        }
    }

    pub fn region(source_path: impl Into<PathBuf>, level: u32, region: Region) -> Self {
        PatchDescriptor::Region {
            source_path: source_path.into(),
            level,
            region,
        }
    }

    pub fn is_on_disk(&self) -> bool {
        matches!(self, PatchDescriptor::OnDisk { .. })
    }

    /// The file a read of this patch opens
    pub fn path(&self) -> &Path {
        match self {
            PatchDescriptor::OnDisk { patch_path } => patch_path,
            PatchDescriptor::Region { source_path, .. } => source_path,
        }
    }
}

impl fmt::Display for PatchDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchDescriptor::OnDisk { patch_path } => {
                write!(f, "patch file {}", patch_path.display())
            }
            PatchDescriptor::Region {
                source_path,
                level,
                region,
            } => write!(
                f,
                "region {} at level {} of {}",
                region,
                level,
                source_path.display()
            ),
        }
    }
}

/// Slide and patch counts of one dataset, as reported in run metadata
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetSummary {
    /// Slide identifiers (index file stems) that contributed patches
    pub wsis: Vec<String>,
    pub num_wsis: usize,
    pub num_images: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_from_corners() {
        let region = Region::from_corners(10, 20, 60, 45).unwrap();
        assert_eq!(region, Region::new(10, 20, 50, 25));
    }

    #[test]
    fn test_degenerate_corners_rejected() {
        assert!(Region::from_corners(10, 10, 10, 20).is_none());
        assert!(Region::from_corners(10, 30, 20, 20).is_none());
    }

    #[test]
    fn test_fits_within() {
        let region = Region::new(10, 10, 50, 50);
        assert!(region.fits_within(60, 60));
        assert!(!region.fits_within(59, 60));
        assert!(!Region::new(u32::MAX, 0, 1, 1).fits_within(u32::MAX, 1));
    }

    #[test]
    fn test_display_names_the_patch() {
        let d = PatchDescriptor::region("/slides/a.tiff", 2, Region::new(0, 0, 10, 10));
        assert_eq!(d.to_string(), "region (0, 0, 10, 10) at level 2 of /slides/a.tiff");
        assert!(!d.is_on_disk());

        let d = PatchDescriptor::on_disk("/patches/p1.png");
        assert_eq!(d.to_string(), "patch file /patches/p1.png");
        assert!(d.is_on_disk());
    }

    #[test]
    fn test_serialization_is_tagged() {
        let d = PatchDescriptor::on_disk("p1.png");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "on_disk");
        assert_eq!(json["patch_path"], "p1.png");
    }
}
