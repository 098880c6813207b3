use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::descriptor::{DatasetSummary, PatchDescriptor};
use super::sidecar::read_json_index;
use super::tabular::read_parquet_index;
use crate::error::{PatchkitError, Result};

/// Sidecar naming convention of the per-slide index files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    /// `<slide>.json` with `slide_path`, `slide_level` and `patch_pos`
    #[default]
    Json,
    /// `<slide>.parquet` with a `patch_file` column
    Parquet,
}

impl IndexFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            IndexFormat::Json => "json",
            IndexFormat::Parquet => "parquet",
        }
    }
}

/// How an index directory is turned into a dataset
///
/// Slide truncation and per-slide subsampling are off unless asked for.
#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    pub format: IndexFormat,
    /// Keep only the first N discovered index files
    pub max_slides: Option<usize>,
    /// Uniformly subsample each slide down to at most N patches
    pub max_patches_per_slide: Option<usize>,
    /// Seed for the subsampling RNG
    pub seed: u64,
}

impl IndexOptions {
    pub fn new(format: IndexFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }
}

/// Flat, randomly addressable list of every patch under an index directory
///
/// Built once, immutable afterwards. Descriptors are a handful of scalars
/// each, so the whole list is held in memory for O(1) shuffled access.
#[derive(Debug, Clone)]
pub struct PatchIndex {
    root: PathBuf,
    patches: Vec<PatchDescriptor>,
    slides: Vec<String>,
}

impl PatchIndex {
    /// Build from the JSON index files in `dir`
    pub fn build(dir: impl AsRef<Path>) -> Result<Self> {
        Self::build_with(dir, &IndexOptions::default())
    }

    pub fn build_with(dir: impl AsRef<Path>, options: &IndexOptions) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let mut files = discover_index_files(&root, options.format)?;

        if let Some(max) = options.max_slides {
            if files.len() > max {
                info!("Limiting dataset to the first {} of {} slides", max, files.len());
                files.truncate(max);
            }
        }

        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut patches = Vec::new();
        let mut slides = Vec::new();

        for (n, file) in files.iter().enumerate() {
            let mut slide_patches = match options.format {
                IndexFormat::Json => read_json_index(file, &root)?,
                IndexFormat::Parquet => read_parquet_index(file, &root)?,
            };

            if let Some(cap) = options.max_patches_per_slide {
                if slide_patches.len() > cap {
                    let mut keep =
                        rand::seq::index::sample(&mut rng, slide_patches.len(), cap).into_vec();
                    keep.sort_unstable();
                    slide_patches = keep.into_iter().map(|i| slide_patches[i].clone()).collect();
                }
            }

            debug!(
                file = %file.display(),
                patches = slide_patches.len(),
                "Reading data [{}/{}]",
                n + 1,
                files.len()
            );

            if !slide_patches.is_empty() {
                slides.push(slide_id(file));
                patches.extend(slide_patches);
            }
        }

        if patches.is_empty() {
            return Err(PatchkitError::config(
                &root,
                format!(
                    "no patches found in {} `*.{}` index files",
                    files.len(),
                    options.format.extension()
                ),
            ));
        }

        info!(
            "📊 Dataset will use {} patches from {} slides",
            patches.len(),
            slides.len()
        );

        Ok(Self {
            root,
            patches,
            slides,
        })
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&PatchDescriptor> {
        self.patches
            .get(index)
            .ok_or(PatchkitError::IndexOutOfRange {
                index: i64::try_from(index).unwrap_or(i64::MAX),
                len: self.patches.len(),
            })
    }

    /// Lookup by a signed offset; negative offsets are out of range, never wrapped.
    pub fn at(&self, offset: i64) -> Result<&PatchDescriptor> {
        let out_of_range = PatchkitError::IndexOutOfRange {
            index: offset,
            len: self.patches.len(),
        };
        let index = usize::try_from(offset).map_err(|_| out_of_range)?;
        self.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchDescriptor> {
        self.patches.iter()
    }

    /// Slide identifiers that contributed patches, in discovery order
    pub fn slides(&self) -> &[String] {
        &self.slides
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            wsis: self.slides.clone(),
            num_wsis: self.slides.len(),
            num_images: self.patches.len(),
        }
    }
}

impl<'a> IntoIterator for &'a PatchIndex {
    type Item = &'a PatchDescriptor;
    type IntoIter = std::slice::Iter<'a, PatchDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.patches.iter()
    }
}

/// Index files directly inside `dir`, sorted by file name. Symlinked index
/// files are resolved and included.
fn discover_index_files(dir: &Path, format: IndexFormat) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| PatchkitError::config(dir, format!("cannot scan: {e}")))?;
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(format.extension()))
            .unwrap_or(false);
        if entry.file_type().is_file() && matches {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn slide_id(file: &Path) -> String {
    file.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
