//! Job Execution Orchestrator
//!
//! **[ORC-SEQ-010]** Drives each job through load → mask → train → predict
//! → write → evict, in job order. One task is one logical thread of control:
//! later jobs may reuse anchors loaded by earlier ones, and the
//! deterministic eviction analysis assumes sequential execution.
//!
//! **[ORC-ISO-020]** Failure isolation: a fatal configuration error aborts
//! the task before any job runs; an anchor load or train failure aborts
//! only its job; a prediction or write failure aborts only that one date's
//! output. Every skipped or failed date lands in the task report; nothing
//! is silently dropped.

use crate::algorithm::{FusionAlgorithm, PredictContext};
use crate::events::TaskEvent;
use crate::io::{ImageReader, ImageWriter};
use crate::jobs::{decompose, DateCase, Decomposition, DecompositionInput, Job};
use crate::mask::{compose_mask, fill_mask, MaskSpec};
use crate::pixel_state::state_raster;
use crate::store::ImageStore;
use chrono::{DateTime, Utc};
use rsfuse_common::config::TaskConfig;
use rsfuse_common::image::{synthesize_nodata, GeoInfo, Mask};
use rsfuse_common::types::{Date, DictionaryReuse, ExistingPolicy, ImageKey, OutlierPolicy};
use rsfuse_common::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Resolved, immutable inputs for one task run
#[derive(Debug, Clone)]
pub struct TaskInputs {
    pub high_tag: String,
    pub low_tag: String,
    /// High-resolution anchors: date → raster path
    pub high: BTreeMap<Date, PathBuf>,
    /// Low-resolution series: date → raster path
    pub low: BTreeMap<Date, PathBuf>,
    /// External boolean mask rasters per role (nonzero = valid)
    pub high_mask_rasters: BTreeMap<Date, PathBuf>,
    pub low_mask_rasters: BTreeMap<Date, PathBuf>,
    /// Requested prediction dates → output path
    pub outputs: BTreeMap<Date, PathBuf>,
    /// Prediction dates → pixel-state raster path, when enabled
    pub state_outputs: BTreeMap<Date, PathBuf>,
    pub high_mask: MaskSpec,
    pub low_mask: MaskSpec,
    pub outlier_policy: OutlierPolicy,
    pub existing_policy: ExistingPolicy,
    pub prefer_fill_over_nodata: bool,
    pub workers: usize,
    pub dictionary_path: Option<PathBuf>,
    pub dictionary_reuse: DictionaryReuse,
}

impl TaskInputs {
    /// Resolve a validated task configuration into run inputs
    pub fn from_config(config: &TaskConfig) -> Self {
        let outputs = config
            .predict
            .iter()
            .map(|p| (p.date, config.output_path(p.date)))
            .collect();
        let state_outputs = config
            .predict
            .iter()
            .filter_map(|p| config.state_path(p.date).map(|path| (p.date, path)))
            .collect();
        let mask_rasters = |entries: &[rsfuse_common::config::ImageEntry]| {
            entries
                .iter()
                .filter_map(|e| e.mask.as_ref().map(|m| (e.date, m.clone())))
                .collect()
        };
        Self {
            high_tag: config.high_tag.clone(),
            low_tag: config.low_tag.clone(),
            high: config.high.iter().map(|e| (e.date, e.path.clone())).collect(),
            low: config.low.iter().map(|e| (e.date, e.path.clone())).collect(),
            high_mask_rasters: mask_rasters(&config.high),
            low_mask_rasters: mask_rasters(&config.low),
            outputs,
            state_outputs,
            high_mask: MaskSpec::from_rules(&config.high_mask),
            low_mask: MaskSpec::from_rules(&config.low_mask),
            outlier_policy: config.outlier_policy,
            existing_policy: config.existing_policy,
            prefer_fill_over_nodata: config.prefer_fill_over_nodata,
            workers: config.workers,
            dictionary_path: config.dictionary_path.clone(),
            dictionary_reuse: config.dictionary_reuse,
        }
    }
}

/// Outcome summary of one task run
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    /// Dates written, with their output paths
    pub predicted: Vec<(Date, PathBuf)>,
    /// Dates that bypassed prediction, with the reason
    pub skipped: Vec<(Date, String)>,
    /// Dates that failed, with the error
    pub failed: Vec<(Date, String)>,
    /// Largest number of images held by the store at any point
    pub peak_store: usize,
}

/// Mutable state threaded through one run
struct RunState {
    store: ImageStore,
    geos: HashMap<ImageKey, GeoInfo>,
    /// Externally supplied boolean masks, keyed like their images
    ext_masks: HashMap<ImageKey, Mask>,
    predicted: Vec<(Date, PathBuf)>,
    skipped: Vec<(Date, String)>,
    failed: Vec<(Date, String)>,
    peak: usize,
}

impl RunState {
    fn new() -> Self {
        Self {
            store: ImageStore::new(),
            geos: HashMap::new(),
            ext_masks: HashMap::new(),
            predicted: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            peak: 0,
        }
    }

    fn note_peak(&mut self) {
        self.peak = self.peak.max(self.store.len());
    }

    fn evict(&mut self, key: &ImageKey) {
        if self.store.has(&key.tag, key.date) {
            // remove cannot miss here; has() was just checked
            let _ = self.store.remove(&key.tag, key.date);
            self.geos.remove(key);
            self.ext_masks.remove(key);
        }
    }
}

/// Sequences jobs over the store, the mask pipeline and a fusion algorithm
pub struct Orchestrator<R: ImageReader, W: ImageWriter> {
    reader: R,
    writer: W,
    event_tx: Option<Sender<TaskEvent>>,
}

impl<R: ImageReader, W: ImageWriter> Orchestrator<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            event_tx: None,
        }
    }

    /// Attach a progress event channel
    pub fn with_events(reader: R, writer: W, event_tx: Sender<TaskEvent>) -> Self {
        Self {
            reader,
            writer,
            event_tx: Some(event_tx),
        }
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Execute a complete task
    ///
    /// Returns `Err` only for fatal configuration problems (raised before
    /// any job runs) or a failed dictionary restore; per-job and per-date
    /// problems are isolated and reported in the `TaskReport`.
    pub fn run(
        &mut self,
        inputs: &TaskInputs,
        algo: &mut dyn FusionAlgorithm,
    ) -> Result<TaskReport> {
        let task_id = Uuid::new_v4();
        let started = Utc::now();
        info!(%task_id, algorithm = algo.name(), "Task starting");

        let decomposition = decompose(&DecompositionInput {
            high_dates: inputs.high.keys().copied().collect(),
            low_dates: inputs.low.keys().copied().collect(),
            requested: inputs.outputs.keys().copied().collect(),
            policy: inputs.outlier_policy,
            min_anchors: algo.min_anchors(),
        })?;
        info!(
            pair_dates = ?decomposition.pair_dates,
            jobs = decomposition.jobs.len(),
            bypassed = decomposition.bypassed.len(),
            "Decomposition complete"
        );
        self.emit(TaskEvent::TaskStarted {
            jobs: decomposition.jobs.len(),
        });

        if let (Some(path), DictionaryReuse::Improve | DictionaryReuse::Use) =
            (&inputs.dictionary_path, inputs.dictionary_reuse)
        {
            algo.restore(path)?;
            info!(path = %path.display(), "Restored algorithm state");
        }

        let mut state = RunState::new();

        self.handle_bypassed(inputs, &decomposition, algo, &mut state);

        let evict_after = eviction_plan(&decomposition.jobs, &inputs.high_tag, &inputs.low_tag);
        for (index, job) in decomposition.jobs.iter().enumerate() {
            self.emit(TaskEvent::JobStarted {
                index,
                date1: job.date1,
                date3: job.date3,
            });
            if let Err(e) = self.run_job(inputs, job, algo, &mut state) {
                error!(date1 = job.date1, error = %e, "Job failed");
                for &date in &job.dates {
                    self.emit(TaskEvent::DateFailed {
                        date,
                        error: e.to_string(),
                    });
                    state.failed.push((date, e.to_string()));
                }
            }
            for key in &evict_after[index] {
                state.evict(key);
            }
            self.emit(TaskEvent::JobFinished { index });
        }

        if let Some(path) = &inputs.dictionary_path {
            if inputs.dictionary_reuse != DictionaryReuse::Use {
                if let Err(e) = algo.persist(path) {
                    warn!(path = %path.display(), error = %e, "Could not persist algorithm state");
                }
            }
        }

        let report = TaskReport {
            task_id,
            started,
            finished: Utc::now(),
            predicted: state.predicted,
            skipped: state.skipped,
            failed: state.failed,
            peak_store: state.peak,
        };
        info!(
            %task_id,
            predicted = report.predicted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            peak_store = report.peak_store,
            "Task finished"
        );
        self.emit(TaskEvent::TaskFinished {
            predicted: report.predicted.len(),
            skipped: report.skipped.len(),
            failed: report.failed.len(),
        });
        Ok(report)
    }

    /// Report or resolve the dates that bypass prediction
    ///
    /// **[ORC-BYP-030]** "No input" dates are reported and skipped; dates
    /// with an existing high-resolution image follow the `ExistingPolicy`.
    fn handle_bypassed(
        &mut self,
        inputs: &TaskInputs,
        decomposition: &Decomposition,
        algo: &mut dyn FusionAlgorithm,
        state: &mut RunState,
    ) {
        for (date, case) in &decomposition.bypassed {
            let date = *date;
            match case {
                DateCase::NoInput => {
                    let e = Error::MissingInput { date };
                    warn!(date, "Skipping date: {}", e);
                    self.emit(TaskEvent::DateFailed {
                        date,
                        error: e.to_string(),
                    });
                    state.failed.push((date, e.to_string()));
                }
                DateCase::Outlier => {
                    let reason = "outside the anchored span (policy 'ignore')".to_string();
                    debug!(date, "Skipping outlier date");
                    self.emit(TaskEvent::DateSkipped {
                        date,
                        reason: reason.clone(),
                    });
                    state.skipped.push((date, reason));
                }
                DateCase::BothPresent | DateCase::HighOnly => {
                    self.handle_existing(inputs, date, algo, state);
                }
                // Decomposition only records bypass cases
                DateCase::NotRequested | DateCase::BetweenPair(_) => {}
            }
        }
    }

    /// Apply the `ExistingPolicy` to one date that already has a
    /// high-resolution image
    fn handle_existing(
        &mut self,
        inputs: &TaskInputs,
        date: Date,
        algo: &mut dyn FusionAlgorithm,
        state: &mut RunState,
    ) {
        match inputs.existing_policy {
            ExistingPolicy::Ignore => {
                let reason = "high-resolution image already present".to_string();
                debug!(date, "Skipping date with existing image");
                self.emit(TaskEvent::DateSkipped {
                    date,
                    reason: reason.clone(),
                });
                state.skipped.push((date, reason));
            }
            ExistingPolicy::Copy => {
                let result = (|| -> Result<PathBuf> {
                    let path = &inputs.high[&date];
                    let (img, geo) = self.reader.load(path, None, None)?;
                    let output = inputs.outputs[&date].clone();
                    self.writer.write(&img, &geo, &output)?;
                    Ok(output)
                })();
                match result {
                    Ok(output) => {
                        info!(date, output = %output.display(), "Copied existing image");
                        self.emit(TaskEvent::DatePredicted {
                            date,
                            output: output.clone(),
                        });
                        state.predicted.push((date, output));
                    }
                    Err(e) => {
                        error!(date, error = %e, "Copy of existing image failed");
                        self.emit(TaskEvent::DateFailed {
                            date,
                            error: e.to_string(),
                        });
                        state.failed.push((date, e.to_string()));
                    }
                }
            }
            ExistingPolicy::Force => {
                // Run the normal prediction path with the date itself as a
                // degenerate single-image anchor
                let job = Job {
                    date1: date,
                    date3: None,
                    dates: vec![date],
                };
                if let Err(e) = self.run_job(inputs, &job, algo, state) {
                    error!(date, error = %e, "Forced re-prediction failed");
                    self.emit(TaskEvent::DateFailed {
                        date,
                        error: e.to_string(),
                    });
                    state.failed.push((date, e.to_string()));
                }
                for tag in [&inputs.high_tag, &inputs.low_tag] {
                    state.evict(&ImageKey::new(tag.clone(), date));
                }
            }
        }
    }

    /// Execute one job; `Err` means the whole job failed (anchor load or
    /// train), before any of its dates were attempted
    fn run_job(
        &mut self,
        inputs: &TaskInputs,
        job: &Job,
        algo: &mut dyn FusionAlgorithm,
        state: &mut RunState,
    ) -> Result<()> {
        // Load: idempotent anchor loads, shared anchors survive across jobs
        for date in job.anchor_dates() {
            self.load_role(&inputs.high_tag, &inputs.high, &inputs.high_mask_rasters, date, state)?;
            self.load_role(&inputs.low_tag, &inputs.low, &inputs.low_mask_rasters, date, state)?;
        }
        state.note_peak();

        // Mask: AND across every anchor date and both roles
        let mut pair_mask = Mask::unrestricted();
        for date in job.anchor_dates() {
            pair_mask = self.role_mask(&inputs.high_tag, date, &inputs.high_mask, &pair_mask, state)?;
            pair_mask = self.role_mask(&inputs.low_tag, date, &inputs.low_mask, &pair_mask, state)?;
        }

        // Train: once per job, before any prediction in it
        if algo.is_stateful() && inputs.dictionary_reuse != DictionaryReuse::Use {
            let ctx = PredictContext {
                store: &state.store,
                high_tag: &inputs.high_tag,
                low_tag: &inputs.low_tag,
                date1: job.date1,
                date3: job.date3,
                workers: inputs.workers,
            };
            algo.train(&ctx, &pair_mask)?;
            debug!(date1 = job.date1, "Trained algorithm on anchor pair");
        }

        // Predict-and-write, isolating each date
        for &date in &job.dates {
            match self.run_date(inputs, job, date, &pair_mask, algo, state) {
                Ok(output) => {
                    self.emit(TaskEvent::DatePredicted {
                        date,
                        output: output.clone(),
                    });
                    state.predicted.push((date, output));
                }
                Err(e) => {
                    error!(date, error = %e, "Prediction failed");
                    self.emit(TaskEvent::DateFailed {
                        date,
                        error: e.to_string(),
                    });
                    state.failed.push((date, e.to_string()));
                }
            }
            // The prediction-role image is never needed again
            state.evict(&ImageKey::new(inputs.low_tag.clone(), date));
        }
        Ok(())
    }

    /// Load one role's image (and its external mask raster, if declared)
    /// for a date into the store, if declared and not already present
    fn load_role(
        &mut self,
        tag: &str,
        paths: &BTreeMap<Date, PathBuf>,
        mask_paths: &BTreeMap<Date, PathBuf>,
        date: Date,
        state: &mut RunState,
    ) -> Result<()> {
        if state.store.has(tag, date) {
            return Ok(());
        }
        let Some(path) = paths.get(&date) else {
            return Ok(());
        };
        let (img, geo) = self.reader.load(path, None, None)?;
        let key = ImageKey::new(tag.to_string(), date);
        if let Some(mask_path) = mask_paths.get(&date) {
            let (mask_img, _) = self.reader.load(mask_path, None, None)?;
            state.ext_masks.insert(key.clone(), Mask::from_image(&mask_img));
        }
        state.store.set(tag.to_string(), date, img);
        state.geos.insert(key, geo);
        Ok(())
    }

    /// AND `base` with the composed mask of one stored role image
    fn role_mask(
        &self,
        tag: &str,
        date: Date,
        spec: &MaskSpec,
        base: &Mask,
        state: &RunState,
    ) -> Result<Mask> {
        if !state.store.has(tag, date) {
            return Ok(base.clone());
        }
        let img = state.store.get(tag, date)?;
        let key = ImageKey::new(tag.to_string(), date);
        let geo = state.geos.get(&key).cloned().unwrap_or_else(|| GeoInfo::for_image(img));
        let base = match state.ext_masks.get(&key) {
            Some(ext) => base.and_with(ext),
            None => base.clone(),
        };
        Ok(compose_mask(&base, img, spec, &geo))
    }

    /// Predict one date, write its outputs and return the output path
    fn run_date(
        &mut self,
        inputs: &TaskInputs,
        job: &Job,
        date: Date,
        pair_mask: &Mask,
        algo: &mut dyn FusionAlgorithm,
        state: &mut RunState,
    ) -> Result<PathBuf> {
        // Load the prediction-role image; its mask layers on the pair mask
        self.load_role(&inputs.low_tag, &inputs.low, &inputs.low_mask_rasters, date, state)?;
        state.note_peak();

        let pred_mask = self.role_mask(&inputs.low_tag, date, &inputs.low_mask, pair_mask, state)?;
        let fill = if state.store.has(&inputs.low_tag, date) {
            fill_mask(state.store.get(&inputs.low_tag, date)?, &inputs.low_mask)
        } else {
            None
        };

        let prediction = {
            let ctx = PredictContext {
                store: &state.store,
                high_tag: &inputs.high_tag,
                low_tag: &inputs.low_tag,
                date1: job.date1,
                date3: job.date3,
                workers: inputs.workers,
            };
            algo.predict(&ctx, date, &pred_mask)?
        };
        let mut image = prediction.image;

        // Output georeference follows the first anchor; synthesize a nodata
        // value when none is declared
        let anchor_key = ImageKey::new(inputs.high_tag.clone(), job.date1);
        let mut geo = state
            .geos
            .get(&anchor_key)
            .cloned()
            .unwrap_or_else(|| GeoInfo::for_image(&image));
        geo.width = image.width();
        geo.height = image.height();
        geo.channels = image.channels();
        geo.base_type = image.base_type();
        if geo.nodata.is_none() {
            match synthesize_nodata(&image) {
                Some(nodata) => {
                    debug!(date, nodata, "Synthesized nodata value");
                    geo.nodata = Some(nodata);
                }
                None => warn!(date, "No free nodata value; output written without one"),
            }
        }
        if let Some(nodata) = geo.nodata {
            // Under the fill policy, flagged pixels keep their predicted
            // values; only permanently invalid samples get the sentinel
            let keep = match &fill {
                Some(f) if inputs.prefer_fill_over_nodata => pred_mask.or_with(f),
                _ => pred_mask.clone(),
            };
            image.substitute_nodata(&keep, nodata);
        }

        // A write failure aborts only this output, not the job or the task
        let output = inputs.outputs[&date].clone();
        self.writer.write(&image, &geo, &output).inspect_err(|e| {
            self.emit(TaskEvent::WriteFailed {
                date,
                path: output.clone(),
                error: e.to_string(),
            });
        })?;

        if let Some(state_path) = inputs.state_outputs.get(&date) {
            let states = state_raster(
                image.width(),
                image.height(),
                image.channels(),
                &pred_mask,
                fill.as_ref(),
                &prediction.filled,
                inputs.prefer_fill_over_nodata,
            );
            let state_geo = GeoInfo::for_image(&states);
            if let Err(e) = self.writer.write(&states, &state_geo, state_path) {
                // State rasters are diagnostics; their failure never undoes
                // the prediction output
                warn!(date, path = %state_path.display(), error = %e, "State raster write failed");
                self.emit(TaskEvent::WriteFailed {
                    date,
                    path: state_path.clone(),
                    error: e.to_string(),
                });
            }
        }
        Ok(output)
    }
}

/// For each job index, the anchor keys whose last use is that job
///
/// **[ORC-EVI-040]** Derived from the job order once per task; after job
/// *i* finishes, exactly the keys in `plan[i]` are evicted, which keeps the
/// store bounded by a single job's working set.
fn eviction_plan(jobs: &[Job], high_tag: &str, low_tag: &str) -> Vec<Vec<ImageKey>> {
    let mut last_use: HashMap<ImageKey, usize> = HashMap::new();
    for (index, job) in jobs.iter().enumerate() {
        for date in job.anchor_dates() {
            for tag in [high_tag, low_tag] {
                last_use.insert(ImageKey::new(tag.to_string(), date), index);
            }
        }
    }
    let mut plan = vec![Vec::new(); jobs.len()];
    for (key, index) in last_use {
        plan[index].push(key);
    }
    for keys in &mut plan {
        keys.sort_by(|a, b| (&a.tag, a.date).cmp(&(&b.tag, b.date)));
    }
    plan
}
