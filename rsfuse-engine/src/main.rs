//! rsfuse - Time-series image fusion engine
//!
//! **[CLI-OV-010]** Reads a TOML task file, decomposes the requested dates
//! into jobs and drives them through the fusion orchestrator. Inputs are
//! resolved against a data root taken from the command line, the
//! `RSFUSE_DATA_ROOT` environment variable or the task file, in that order.

use anyhow::{bail, Result};
use clap::Parser;
use rsfuse_common::config::{resolve_data_root, TaskConfig, DATA_ROOT_ENV};
use rsfuse_engine::algorithm::LinearInterpolator;
use rsfuse_engine::io::FsImageIo;
use rsfuse_engine::scan::scan_dated_rasters;
use rsfuse_engine::{FusionAlgorithm, Orchestrator, TaskInputs};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "rsfuse", version, about = "Time-series image fusion engine")]
struct Cli {
    /// TOML task file
    task: PathBuf,

    /// Directory that relative raster paths resolve against
    #[arg(long, env = DATA_ROOT_ENV)]
    data_root: Option<PathBuf>,

    /// Scan a directory tree for dated high-resolution rasters
    #[arg(long)]
    high_dir: Option<PathBuf>,

    /// Scan a directory tree for dated low-resolution rasters
    #[arg(long)]
    low_dir: Option<PathBuf>,

    /// Worker threads for prediction (0 = all cores)
    #[arg(long)]
    workers: Option<usize>,

    /// Fusion algorithm
    #[arg(long, default_value = "interpolate")]
    algorithm: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("rsfuse {}", env!("CARGO_PKG_VERSION"));
    info!("Task file: {}", cli.task.display());

    let mut config = TaskConfig::from_path(&cli.task)?;
    if let Some(dir) = &cli.high_dir {
        let scanned = scan_dated_rasters(dir)?;
        info!(count = scanned.len(), dir = %dir.display(), "Scanned high-resolution rasters");
        config.high.extend(scanned);
    }
    if let Some(dir) = &cli.low_dir {
        let scanned = scan_dated_rasters(dir)?;
        info!(count = scanned.len(), dir = %dir.display(), "Scanned low-resolution rasters");
        config.low.extend(scanned);
    }
    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    config.validate()?;

    let data_root = resolve_data_root(cli.data_root.as_deref(), &config);
    info!("Data root: {}", data_root.display());

    let mut algo: Box<dyn FusionAlgorithm> = match cli.algorithm.as_str() {
        "interpolate" => Box::new(LinearInterpolator::new()),
        other => bail!("unknown algorithm '{other}' (available: interpolate)"),
    };

    let io = FsImageIo::new(data_root);
    let mut orchestrator = Orchestrator::new(io.clone(), io);
    let inputs = TaskInputs::from_config(&config);
    let report = orchestrator.run(&inputs, algo.as_mut())?;

    info!(
        task_id = %report.task_id,
        predicted = report.predicted.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Done in {:.1}s",
        (report.finished - report.started).num_milliseconds() as f64 / 1000.0
    );
    for (date, reason) in &report.skipped {
        info!(date, "Skipped: {}", reason);
    }
    for (date, error) in &report.failed {
        warn!(date, "Failed: {}", error);
    }
    if !report.failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
