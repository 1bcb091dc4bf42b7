//! Fusion algorithm capability
//!
//! **[ALG-CAP-010]** The orchestrator drives every method (weighted
//! compositing, regression, dictionary learning, interpolation) through this
//! one strategy trait: optional per-job training for stateful methods, then
//! one synchronous `predict` call per prediction date. A predict call either
//! returns a prediction or fails with an error; there is no cancellation.

pub mod interpolator;

pub use interpolator::LinearInterpolator;

use crate::store::ImageStore;
use rsfuse_common::image::{Image, Mask};
use rsfuse_common::types::Date;
use rsfuse_common::Result;
use std::path::Path;

/// Per-job view handed to the algorithm
///
/// Borrows the store read-only; the anchors named here are guaranteed to be
/// loaded before `train` or `predict` runs.
#[derive(Debug)]
pub struct PredictContext<'a> {
    pub store: &'a ImageStore,
    pub high_tag: &'a str,
    pub low_tag: &'a str,
    pub date1: Date,
    pub date3: Option<Date>,
    /// Worker count for data-parallel pixel work; 0 means "all cores"
    pub workers: usize,
}

/// Result of one prediction
///
/// `filled` marks the samples the algorithm actually produced, so the pixel
/// state classifier can distinguish interpolated from non-interpolated; the
/// unrestricted mask means "everything produced".
#[derive(Debug)]
pub struct Prediction {
    pub image: Image,
    pub filled: Mask,
}

impl Prediction {
    pub fn complete(image: Image) -> Self {
        Self {
            image,
            filled: Mask::unrestricted(),
        }
    }
}

/// Pluggable prediction method
///
/// Implementations must be deterministic given identical inputs and
/// configuration. Internal data-parallelism (bounded by `ctx.workers`) is
/// opaque to the orchestrator.
pub trait FusionAlgorithm {
    fn name(&self) -> &str;

    /// Structural constraint: 1 = single-anchor capable, 2 = double-anchor only
    fn min_anchors(&self) -> usize {
        1
    }

    /// Stateful algorithms keep cross-job state (e.g. a learned dictionary)
    /// and are trained once per job before any prediction in that job
    fn is_stateful(&self) -> bool {
        false
    }

    /// Train on the current job's anchors; no-op for stateless methods
    fn train(&mut self, _ctx: &PredictContext<'_>, _pair_mask: &Mask) -> Result<()> {
        Ok(())
    }

    /// Predict the high-resolution image at `date`
    fn predict(&mut self, ctx: &PredictContext<'_>, date: Date, mask: &Mask)
        -> Result<Prediction>;

    /// Persist trained state; the path is opaque to the engine
    fn persist(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// Restore previously persisted state
    fn restore(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
}
