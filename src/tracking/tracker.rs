use chrono::Local;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use super::archive::archive_dir;
use super::meta::RunMetadata;
use super::store::{ArtifactStore, UploadFailure};
use crate::dataset::DatasetSummary;
use crate::error::{PatchkitError, Result};

pub const META_FILE: &str = "meta.json";

/// What happened to the run archive at finalize
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Archive uploaded; `uri` is `s3://bucket/key`
    Uploaded { archive: PathBuf, uri: String },
    /// The archive was gone by upload time
    ArchiveMissing { archive: PathBuf },
    /// No usable credentials; the archive only exists on local disk
    LocalOnly { archive: PathBuf },
}

/// One training run's directory, metadata and archive
///
/// Created by [`RunTracker::start`]; [`RunTracker::finalize`] consumes the
/// tracker, so a run is finalized at most once.
#[derive(Debug)]
pub struct RunTracker {
    run_id: Uuid,
    experiment_name: String,
    runs_dir: PathBuf,
    run_dir: PathBuf,
    weights_dir: Option<PathBuf>,
    s3_bucket: String,
    config: Value,
}

impl RunTracker {
    /// Create `base_dir/<train.experiment_name>/<run_id>` for a fresh run
    ///
    /// Also creates `<run_dir>/<train.weights_path>` when the config names
    /// one. `train.s3_bucket` is required.
    pub fn start(base_dir: impl AsRef<Path>, config: Value) -> Result<Self> {
        let experiment_name = required_str(&config, "experiment_name")?.to_string();
        let s3_bucket = required_str(&config, "s3_bucket")?.to_string();
        let weights_path = config
            .get("train")
            .and_then(|train| train.get("weights_path"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let run_id = Uuid::new_v4();
        let runs_dir = base_dir.as_ref().join(&experiment_name);
        let run_dir = runs_dir.join(run_id.to_string());
        fs::create_dir_all(&run_dir).map_err(|e| PatchkitError::io(&run_dir, e))?;

        let weights_dir = match weights_path {
            Some(rel) => {
                let dir = run_dir.join(rel);
                fs::create_dir_all(&dir).map_err(|e| PatchkitError::io(&dir, e))?;
                Some(dir)
            }
            None => None,
        };

        info!(
            %run_id,
            experiment = %experiment_name,
            run_dir = %run_dir.display(),
            "🚀 Started run"
        );

        Ok(Self {
            run_id,
            experiment_name,
            runs_dir,
            run_dir,
            weights_dir,
            s3_bucket,
            config,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn weights_dir(&self) -> Option<&Path> {
        self.weights_dir.as_deref()
    }

    pub fn s3_bucket(&self) -> &str {
        &self.s3_bucket
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    /// `runs_dir/<run_id>.tgz`
    pub fn archive_path(&self) -> PathBuf {
        self.runs_dir.join(format!("{}.tgz", self.run_id))
    }

    /// `runs/<experiment_name>/<run_id>.tgz`
    pub fn remote_key(&self) -> String {
        format!("runs/{}/{}.tgz", self.experiment_name, self.run_id)
    }

    /// Write `meta.json` into the run directory
    pub fn write_metadata(
        &self,
        tracked_metrics: Option<Value>,
        train_dataset: DatasetSummary,
        val_dataset: Option<DatasetSummary>,
    ) -> Result<PathBuf> {
        let meta = RunMetadata::new(
            self.run_id,
            &self.config,
            tracked_metrics,
            train_dataset,
            val_dataset,
            Local::now(),
        );
        let path = self.run_dir.join(META_FILE);
        let json = meta
            .to_json()
            .map_err(|e| PatchkitError::config(&path, format!("cannot serialize metadata: {e}")))?;
        fs::write(&path, json).map_err(|e| PatchkitError::io(&path, e))?;
        Ok(path)
    }

    /// Persist the run: metadata, archive, best-effort upload
    ///
    /// A missing archive or missing credentials are reported and leave the
    /// archive on local disk; every other upload failure is an error.
    pub fn finalize(
        self,
        tracked_metrics: Option<Value>,
        train_dataset: DatasetSummary,
        val_dataset: Option<DatasetSummary>,
        store: &dyn ArtifactStore,
    ) -> Result<FinalizeOutcome> {
        self.write_metadata(tracked_metrics, train_dataset, val_dataset)?;

        let archive = self.archive_path();
        archive_dir(&self.run_dir, &archive)?;
        info!("💾 Train artifacts saved to {}", archive.display());

        let key = self.remote_key();
        let uri = format!("s3://{}/{}", self.s3_bucket, key);
        match store.upload(&archive, &self.s3_bucket, &key) {
            Ok(()) => {
                info!("✅ Train artifacts uploaded successfully to {uri}");
                Ok(FinalizeOutcome::Uploaded { archive, uri })
            }
            Err(UploadFailure::ArchiveNotFound(detail)) => {
                warn!("Train artifacts not found ({detail})");
                Ok(FinalizeOutcome::ArchiveMissing { archive })
            }
            Err(UploadFailure::NoCredentials(detail)) => {
                warn!(
                    "⚠️  Credentials not available so train artifacts were not uploaded \
                     ({detail}). Weights stored in {}",
                    archive.display()
                );
                Ok(FinalizeOutcome::LocalOnly { archive })
            }
            Err(UploadFailure::Other(msg)) => Err(PatchkitError::Upload { uri, msg }),
        }
    }
}

fn required_str<'a>(config: &'a Value, key: &str) -> Result<&'a str> {
    config
        .get("train")
        .and_then(|train| train.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            PatchkitError::config(format!("train.{key}"), "missing or empty string value")
        })
}
