//! Run metadata document
//!
//! Written as `meta.json` into the run directory right before the run is
//! archived. The layout is read by downstream tooling, so field names are
//! part of the format.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dataset::DatasetSummary;

/// Format of the `timestamp` field
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Summary of one finished run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunMetadata {
    pub run_id: Uuid,

    /// The `model` section of the run config, if any
    pub model_config: Option<Value>,

    /// The `train` section of the run config
    pub train_config: Value,

    pub train_dataset: DatasetSummary,

    /// `null` when the run had no validation set
    pub val_dataset: Option<DatasetSummary>,

    /// `null` when nothing was tracked
    pub tracked_metrics: Option<Value>,

    /// Completion time, local clock, `YYYY-MM-DD HH:MM:SS`
    pub timestamp: String,
}

impl RunMetadata {
    /// Assemble metadata for a run completing at `finished_at`
    ///
    /// Empty metric documents (`{}`, `[]`, `null`) are recorded as `null`.
    pub fn new(
        run_id: Uuid,
        config: &Value,
        tracked_metrics: Option<Value>,
        train_dataset: DatasetSummary,
        val_dataset: Option<DatasetSummary>,
        finished_at: DateTime<Local>,
    ) -> Self {
        Self {
            run_id,
            model_config: config.get("model").cloned(),
            train_config: config.get("train").cloned().unwrap_or(Value::Null),
            train_dataset,
            val_dataset,
            tracked_metrics: tracked_metrics.filter(|m| !is_empty_document(m)),
            timestamp: finished_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
