//! Task configuration loading and data-root resolution
//!
//! **[CFG-TML-010]** A task is described by one TOML file naming the dated
//! rasters for each image role, the mask rules per role, and the policy
//! choices. The engine itself never parses user-facing strings; this module
//! is the boundary where text becomes typed configuration.
//!
//! **[CFG-ROOT-020]** Data-root resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. `RSFUSE_DATA_ROOT` environment variable
//! 3. `data_root` key in the task file
//! 4. Current directory (fallback)

use crate::error::{Error, Result};
use crate::interval::{Interval, IntervalSet};
use crate::types::{Date, DictionaryReuse, ExistingPolicy, OutlierPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the environment variable overriding the data root
pub const DATA_ROOT_ENV: &str = "RSFUSE_DATA_ROOT";

/// One dated raster belonging to an image role
///
/// `mask` optionally names a boolean mask raster (nonzero = valid) that is
/// ANDed into the composed mask whenever this image is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub path: PathBuf,
    pub date: Date,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<PathBuf>,
}

/// One requested prediction date with an optional explicit output path
///
/// When `output` is absent the task's `output_template` is used with
/// `{date}` substituted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEntry {
    pub date: Date,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// A single valid/invalid range rule, applied in declaration order
///
/// **[CFG-MSK-030]** Rules apply strictly in order onto the effective valid
/// set: when the first rule is `valid` the set starts empty, otherwise it
/// starts as the whole real line. Omitted sides default to infinite; sides
/// are closed unless marked open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeRule {
    pub kind: RangeKind,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub min_open: bool,
    #[serde(default)]
    pub max_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeKind {
    Valid,
    Invalid,
}

impl RangeRule {
    fn to_interval(&self) -> Option<Interval> {
        let lo = self.min.unwrap_or(f64::NEG_INFINITY);
        let hi = self.max.unwrap_or(f64::INFINITY);
        Interval::new(lo, !self.min_open, hi, !self.max_open)
    }
}

/// Build the effective valid set from ordered range rules
///
/// No rules at all means "no restriction" (the whole real line).
pub fn build_valid_set(rules: &[RangeRule]) -> IntervalSet {
    let mut set = match rules.first() {
        None => return IntervalSet::all_reals(),
        Some(rule) if rule.kind == RangeKind::Valid => IntervalSet::new(),
        Some(_) => IntervalSet::all_reals(),
    };
    for rule in rules {
        let Some(iv) = rule.to_interval() else {
            warn!(?rule, "Ignoring empty range rule");
            continue;
        };
        match rule.kind {
            RangeKind::Valid => set.union_with(iv),
            RangeKind::Invalid => set.subtract(iv),
        }
    }
    set
}

/// Mask rules for one image role
///
/// The hand-written `Default` keeps `exclude_nodata` on when the whole
/// mask table is absent from the task file, matching the field default
/// used when the table is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskRules {
    /// Valid/invalid value ranges, applied in order
    #[serde(default)]
    pub ranges: Vec<RangeRule>,
    /// Exclude the image's declared nodata value from the valid set
    #[serde(default = "default_true")]
    pub exclude_nodata: bool,
    /// Values flagged as "needs filling" (e.g. a cloud flag)
    #[serde(default)]
    pub fill_ranges: Vec<RangeRule>,
}

impl Default for MaskRules {
    fn default() -> Self {
        Self {
            ranges: Vec::new(),
            exclude_nodata: true,
            fill_ranges: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Complete task description loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Base directory for relative raster paths (lowest-priority source)
    #[serde(default)]
    pub data_root: Option<PathBuf>,

    #[serde(default = "default_high_tag")]
    pub high_tag: String,
    #[serde(default = "default_low_tag")]
    pub low_tag: String,

    /// High-resolution anchor images
    pub high: Vec<ImageEntry>,
    /// Low-resolution anchor/series images
    pub low: Vec<ImageEntry>,
    /// Requested prediction dates
    pub predict: Vec<PredictionEntry>,

    /// Output path template; `{date}` is replaced by the prediction date
    #[serde(default = "default_output_template")]
    pub output_template: String,
    /// Optional template for pixel-state rasters; absent disables them
    #[serde(default)]
    pub state_template: Option<String>,

    #[serde(default)]
    pub outlier_policy: OutlierPolicy,
    #[serde(default)]
    pub existing_policy: ExistingPolicy,

    /// Treat invalid-but-flagged pixels as fillable
    #[serde(default)]
    pub prefer_fill_over_nodata: bool,

    /// Worker count for data-parallel prediction; 0 means "all cores"
    #[serde(default)]
    pub workers: usize,

    #[serde(default)]
    pub high_mask: MaskRules,
    #[serde(default)]
    pub low_mask: MaskRules,

    /// Persisted model path for dictionary-style algorithms
    #[serde(default)]
    pub dictionary_path: Option<PathBuf>,
    #[serde(default)]
    pub dictionary_reuse: DictionaryReuse,
}

fn default_high_tag() -> String {
    "high".to_string()
}

fn default_low_tag() -> String {
    "low".to_string()
}

fn default_output_template() -> String {
    "predicted_{date}.tif".to_string()
}

impl TaskConfig {
    /// Load and validate a task file
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: TaskConfig = toml::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the decomposition engine cannot accept
    pub fn validate(&self) -> Result<()> {
        if self.high_tag == self.low_tag {
            return Err(Error::Config(format!(
                "resolution tags must differ, both are '{}'",
                self.high_tag
            )));
        }
        check_unique_dates("high", self.high.iter().map(|e| e.date))?;
        check_unique_dates("low", self.low.iter().map(|e| e.date))?;
        check_unique_dates("predict", self.predict.iter().map(|e| e.date))?;
        if self.predict.is_empty() {
            return Err(Error::Config("no prediction dates requested".to_string()));
        }
        Ok(())
    }

    /// Output path for a prediction date
    pub fn output_path(&self, date: Date) -> PathBuf {
        self.predict
            .iter()
            .find(|p| p.date == date)
            .and_then(|p| p.output.clone())
            .unwrap_or_else(|| {
                PathBuf::from(self.output_template.replace("{date}", &date.to_string()))
            })
    }

    /// State-raster path for a prediction date, if state output is enabled
    pub fn state_path(&self, date: Date) -> Option<PathBuf> {
        self.state_template
            .as_ref()
            .map(|t| PathBuf::from(t.replace("{date}", &date.to_string())))
    }
}

fn check_unique_dates(role: &str, dates: impl Iterator<Item = Date>) -> Result<()> {
    let mut seen = HashSet::new();
    for date in dates {
        if !seen.insert(date) {
            return Err(Error::Config(format!(
                "duplicate date {} in role '{}'",
                date, role
            )));
        }
    }
    Ok(())
}

/// Resolve the data root from the configured priority order
pub fn resolve_data_root(cli: Option<&Path>, config: &TaskConfig) -> PathBuf {
    let env = std::env::var_os(DATA_ROOT_ENV).map(PathBuf::from);
    resolve_data_root_from(cli, env, config.data_root.as_deref())
}

/// Precedence logic with the environment value injected, for testability
pub fn resolve_data_root_from(
    cli: Option<&Path>,
    env: Option<PathBuf>,
    config: Option<&Path>,
) -> PathBuf {
    let mut sources = Vec::new();
    if cli.is_some() {
        sources.push("command line");
    }
    if env.is_some() {
        sources.push("environment");
    }
    if config.is_some() {
        sources.push("task file");
    }
    if sources.len() > 1 {
        warn!(
            "Data root set in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Some(path) = env {
        return path;
    }
    if let Some(path) = config {
        return path.to_path_buf();
    }
    PathBuf::from(".")
}
