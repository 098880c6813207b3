use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use patchkit::config::{setup, SetupOptions};
use patchkit::{
    logging, IndexFormat, IndexOptions, PatchIndex, PatchRetriever, RunTracker, S3ArtifactStore,
};

#[derive(Parser, Debug)]
#[command(
    name = "patchkit",
    about = "Whole-slide patch datasets and training run tracking"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the patch index of a directory and print its summary as JSON
    Index {
        dir: PathBuf,
        #[command(flatten)]
        index: IndexArgs,
    },
    /// Decode one patch and save it as an image file
    Fetch {
        dir: PathBuf,
        /// Position of the patch in the index
        #[arg(long, allow_negative_numbers = true)]
        index: i64,
        /// Output image path (format from extension)
        #[arg(long)]
        out: PathBuf,
        #[command(flatten)]
        options: IndexArgs,
    },
    /// Set up a run, index its datasets and archive/upload the result
    Track(TrackArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Json,
    Parquet,
}

impl From<FormatArg> for IndexFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Json => IndexFormat::Json,
            FormatArg::Parquet => IndexFormat::Parquet,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct IndexArgs {
    /// Index file convention
    #[arg(long, value_enum, default_value_t = FormatArg::Json)]
    format: FormatArg,
    /// Only use the first N discovered slides
    #[arg(long)]
    max_slides: Option<usize>,
    /// Subsample each slide down to N patches
    #[arg(long)]
    max_patches_per_slide: Option<usize>,
    /// Seed for subsampling (`track` falls back to `train.seed`)
    #[arg(long)]
    seed: Option<u64>,
}

impl IndexArgs {
    fn options(&self) -> IndexOptions {
        IndexOptions {
            format: self.format.into(),
            max_slides: self.max_slides,
            max_patches_per_slide: self.max_patches_per_slide,
            seed: self.seed.unwrap_or_default(),
        }
    }
}

#[derive(Args, Debug)]
struct TrackArgs {
    /// JSON or YAML config layered over the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// `key.path=value` overrides, applied last
    #[arg(long = "set")]
    overrides: Vec<String>,
    /// Where runs are created (default: user data dir)
    #[arg(long)]
    base_dir: Option<PathBuf>,
    /// Relative dataset paths are resolved against this directory
    #[arg(long, default_value = ".")]
    project_root: PathBuf,
    /// Training index directory (default: `train.dataset_path`)
    #[arg(long)]
    dataset: Option<PathBuf>,
    /// Validation index directory
    #[arg(long)]
    val_dataset: Option<PathBuf>,
    /// JSON document of tracked metrics
    #[arg(long)]
    metrics: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    world_size: usize,
    #[command(flatten)]
    index: IndexArgs,
}

fn main() -> Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Index { dir, index } => {
            let patches = PatchIndex::build_with(&dir, &index.options())
                .with_context(|| format!("indexing {}", dir.display()))?;
            println!("{}", serde_json::to_string_pretty(&patches.summary())?);
        }
        Command::Fetch {
            dir,
            index,
            out,
            options,
        } => {
            let patches = PatchIndex::build_with(&dir, &options.options())
                .with_context(|| format!("indexing {}", dir.display()))?;
            let descriptor = patches.at(index)?;
            let image = PatchRetriever::new().fetch(descriptor)?;
            image
                .save(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            let (w, h) = image.dimensions();
            info!("📸 Saved {descriptor} ({w}x{h}) to {}", out.display());
        }
        Command::Track(args) => track(args)?,
    }

    Ok(())
}

fn track(args: TrackArgs) -> Result<()> {
    let base_dir = match args.base_dir {
        Some(dir) => dir,
        None => default_runs_dir()?,
    };
    let options = SetupOptions {
        project_root: args.project_root,
        base_dir,
        config_file: args.config,
        overrides: args.overrides,
        dataset: args.dataset,
        world_size: args.world_size,
    };
    let (cfg, tracker) = setup(&options).context("setting up run")?;

    let mut index_options = args.index.options();
    if args.index.seed.is_none() {
        if let Some(seed) = cfg.pointer("/train/seed").and_then(|v| v.as_u64()) {
            index_options.seed = seed;
        }
    }

    let train_dir = PathBuf::from(
        cfg.pointer("/train/dataset_path")
            .and_then(|v| v.as_str())
            .unwrap_or_default(),
    );
    let train = PatchIndex::build_with(&train_dir, &index_options)
        .with_context(|| format!("indexing training set {}", train_dir.display()))?;
    let val = match &args.val_dataset {
        Some(dir) => Some(
            PatchIndex::build_with(dir, &index_options)
                .with_context(|| format!("indexing validation set {}", dir.display()))?,
        ),
        None => None,
    };

    let metrics = match &args.metrics {
        Some(path) => Some(read_metrics(path)?),
        None => None,
    };

    finish(tracker, metrics, &train, val.as_ref())
}

fn finish(
    tracker: RunTracker,
    metrics: Option<serde_json::Value>,
    train: &PatchIndex,
    val: Option<&PatchIndex>,
) -> Result<()> {
    let run_id = tracker.run_id();
    let store = S3ArtifactStore::from_env().context("configuring S3 client")?;
    let outcome = tracker.finalize(metrics, train.summary(), val.map(PatchIndex::summary), &store)?;
    info!(%run_id, ?outcome, "Run finalized");
    println!("{run_id}");
    Ok(())
}

fn read_metrics(path: &Path) -> Result<serde_json::Value> {
    let raw = fs::read(path).with_context(|| format!("reading metrics {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parsing metrics {}", path.display()))
}

fn default_runs_dir() -> Result<PathBuf> {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .context("could not determine user data directory")?;
    path.push("patchkit");
    path.push("runs");
    Ok(path)
}
