//! Experiment configuration
//!
//! A run config is one JSON document assembled from three layers, later
//! layers winning: built-in defaults, a config file, and `key.path=value`
//! overrides from the command line. Beyond the keys read here the document
//! is opaque and is copied verbatim into the run metadata.

use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PatchkitError, Result};
use crate::tracking::RunTracker;

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Built-in defaults every config is layered over
pub fn default_config() -> Value {
    json!({
        "train": {
            "experiment_name": "default",
            "dataset_path": "",
            "output_dir": ".",
            "batch_size_per_gpu": 64,
            "seed": 0
        },
        "optim": {
            "base_lr": 0.004,
            "scaling_rule": "sqrt_wrt_1024"
        }
    })
}

/// Deep-merge `overlay` into `base`; objects merge key by key, anything
/// else in `overlay` replaces what was there.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Assign `value` at a dotted path, creating intermediate objects
pub fn set_path(cfg: &mut Value, path: &str, value: Value) -> Result<()> {
    let keys: Vec<&str> = path.split('.').collect();
    if keys.iter().any(|k| k.is_empty()) {
        return Err(PatchkitError::config(path, "empty key segment"));
    }

    let mut node = cfg;
    for (depth, key) in keys.iter().enumerate() {
        if node.is_null() {
            *node = Value::Object(Map::new());
        }
        let map = node.as_object_mut().ok_or_else(|| {
            PatchkitError::config(path, format!("`{}` is not an object", keys[..depth].join(".")))
        })?;
        if depth + 1 == keys.len() {
            map.insert(key.to_string(), value);
            return Ok(());
        }
        node = map.entry(key.to_string()).or_insert(Value::Null);
    }
    Ok(())
}

/// Apply one `a.b.c=value` override
///
/// The value is parsed as JSON when it can be (`3`, `true`, `[1,2]`,
/// `"quoted"`), otherwise it is taken as a plain string.
pub fn apply_override(cfg: &mut Value, expr: &str) -> Result<()> {
    let (path, raw) = expr
        .split_once('=')
        .ok_or_else(|| PatchkitError::config(expr, "override must look like key.path=value"))?;
    let raw = raw.trim();
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    set_path(cfg, path.trim(), value)
}

/// Defaults, then `file`, then `overrides`
///
/// `file` is read as YAML when its extension is `.yaml` or `.yml`, as JSON
/// otherwise.
pub fn load_config(file: Option<&Path>, overrides: &[String]) -> Result<Value> {
    let mut cfg = default_config();

    if let Some(path) = file {
        let layer = read_config_layer(path)?;
        if !layer.is_object() {
            return Err(PatchkitError::config(path, "config root must be an object"));
        }
        merge(&mut cfg, layer);
    }

    for expr in overrides {
        apply_override(&mut cfg, expr)?;
    }
    Ok(cfg)
}

fn read_config_layer(path: &Path) -> Result<Value> {
    let raw = fs::read(path).map_err(|e| PatchkitError::io(path, e))?;
    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let parsed = if is_yaml {
        serde_yaml::from_slice(&raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_slice(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| PatchkitError::config(path, format!("malformed config: {e}")))
}

/// Scale the learning rate with the global batch size
///
/// `sqrt_wrt_1024`: `optim.lr = base_lr * sqrt(batch_size_per_gpu * world_size / 1024)`.
/// Returns the new learning rate.
pub fn apply_scaling_rules(cfg: &mut Value, world_size: usize) -> Result<f64> {
    let rule = cfg
        .pointer("/optim/scaling_rule")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if rule != "sqrt_wrt_1024" {
        return Err(PatchkitError::config(
            "optim.scaling_rule",
            format!("unsupported scaling rule {rule:?}"),
        ));
    }

    let base_lr = number_at(cfg, "/optim/base_lr")?;
    let batch_size = number_at(cfg, "/train/batch_size_per_gpu")?;
    let lr = base_lr * (batch_size * world_size as f64 / 1024.0).sqrt();
    set_path(cfg, "optim.lr", json!(lr))?;

    info!("sqrt scaling learning rate; base: {base_lr}, new: {lr}");
    Ok(lr)
}

fn number_at(cfg: &Value, pointer: &str) -> Result<f64> {
    cfg.pointer(pointer)
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            let key = pointer.trim_start_matches('/').replace('/', ".");
            PatchkitError::config(key, "missing number")
        })
}

/// Write `cfg` as pretty JSON to `dir/name`
pub fn write_config(cfg: &Value, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(cfg)
        .map_err(|e| PatchkitError::config(&path, format!("cannot serialize config: {e}")))?;
    fs::write(&path, &json).map_err(|e| PatchkitError::io(&path, e))?;
    info!("📝 Wrote config to {}", path.display());
    Ok(path)
}

/// Inputs of [`setup`]
#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// Relative dataset paths are resolved against this directory
    pub project_root: PathBuf,
    /// Runs are created under `base_dir/<experiment_name>/`
    pub base_dir: PathBuf,
    pub config_file: Option<PathBuf>,
    pub overrides: Vec<String>,
    /// Replaces `train.dataset_path` when set
    pub dataset: Option<PathBuf>,
    pub world_size: usize,
}

/// Resolve the config of a training run and start tracking it
///
/// Sets `train.dataset_path`, `train.run_id` and `train.output_dir` (the run
/// directory), applies the learning-rate scaling rule and writes the final
/// config into the run directory.
pub fn setup(options: &SetupOptions) -> Result<(Value, RunTracker)> {
    let mut cfg = load_config(options.config_file.as_deref(), &options.overrides)?;

    let dataset = match &options.dataset {
        Some(path) => path.clone(),
        None => PathBuf::from(
            cfg.pointer("/train/dataset_path")
                .and_then(Value::as_str)
                .unwrap_or_default(),
        ),
    };
    let dataset = options.project_root.join(dataset);
    set_path(&mut cfg, "train.dataset_path", json!(dataset.display().to_string()))?;

    let tracker = RunTracker::start(&options.base_dir, cfg.clone())?;
    set_path(&mut cfg, "train.run_id", json!(tracker.run_id().to_string()))?;
    set_path(&mut cfg, "train.output_dir", json!(tracker.run_dir().display().to_string()))?;

    apply_scaling_rules(&mut cfg, options.world_size.max(1))?;
    write_config(&cfg, tracker.run_dir(), CONFIG_FILE_NAME)?;
    Ok((cfg, tracker))
}
