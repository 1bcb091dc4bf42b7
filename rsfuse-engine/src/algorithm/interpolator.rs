//! Temporal linear interpolation between anchor dates
//!
//! **[ALG-INT-010]** The built-in single-anchor-capable method: for a
//! prediction date between two anchors it blends the two high-resolution
//! anchor images weighted by temporal distance; with only one anchor on one
//! side it carries that anchor forward/backward. Anchors are found by a
//! left/right search over the dates currently stored under the
//! high-resolution tag, so the same code serves double-anchor jobs, the
//! single-anchor outlier modes, and the degenerate predict-from-itself case.

use super::{FusionAlgorithm, PredictContext, Prediction};
use rayon::prelude::*;
use rsfuse_common::image::{Image, ImageData, Mask};
use rsfuse_common::types::Date;
use rsfuse_common::{Error, Result};
use tracing::debug;

/// Stateless temporal interpolator
#[derive(Debug, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl FusionAlgorithm for LinearInterpolator {
    fn name(&self) -> &str {
        "interpolate"
    }

    fn predict(
        &mut self,
        ctx: &PredictContext<'_>,
        date: Date,
        _mask: &Mask,
    ) -> Result<Prediction> {
        let anchor_dates = ctx.store.dates(ctx.high_tag);
        // Left/right neighbour search over the stored high-resolution dates
        let left = anchor_dates.iter().copied().filter(|d| *d <= date).max();
        let right = anchor_dates.iter().copied().filter(|d| *d >= date).min();

        let (image, blend) = match (left, right) {
            (Some(l), Some(r)) if l == r => {
                // The date is itself an anchor: predict-from-itself
                (ctx.store.get(ctx.high_tag, l)?.clone(), None)
            }
            (Some(l), Some(r)) => {
                let left_img = ctx.store.get(ctx.high_tag, l)?;
                let right_img = ctx.store.get(ctx.high_tag, r)?;
                if !left_img.same_shape(right_img) {
                    return Err(Error::InvalidImage(format!(
                        "anchor images at dates {} and {} differ in shape",
                        l, r
                    )));
                }
                let weight = (r - date) as f64 / (r - l) as f64;
                (
                    blend_images(left_img, right_img, weight, ctx.workers)?,
                    Some(weight),
                )
            }
            (Some(d), None) | (None, Some(d)) => {
                // Outlier side: carry the nearest anchor over
                (ctx.store.get(ctx.high_tag, d)?.clone(), None)
            }
            (None, None) => return Err(Error::MissingInput { date }),
        };
        debug!(date, ?left, ?right, ?blend, "Interpolated prediction");
        Ok(Prediction::complete(image))
    }
}

/// `weight * left + (1 - weight) * right`, row-parallel
fn blend_images(left: &Image, right: &Image, weight: f64, workers: usize) -> Result<Image> {
    let (width, height, channels) = (left.width(), left.height(), left.channels());
    let row_len = width * channels;
    let mut values = vec![0.0f64; row_len * height];

    let blend_rows = |values: &mut Vec<f64>| {
        values
            .par_chunks_mut(row_len)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..width {
                    for c in 0..channels {
                        row[x * channels + c] =
                            weight * left.get(x, y, c) + (1.0 - weight) * right.get(x, y, c);
                    }
                }
            });
    };

    if workers == 0 {
        blend_rows(&mut values);
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::Config(format!("worker pool: {}", e)))?;
        pool.install(|| blend_rows(&mut values));
    }

    // Keep the anchors' base type; integer types round and saturate on store
    let mut out = Image::from_data(width, height, channels, ImageData::F64(values))?;
    if out.base_type() != left.base_type() {
        let mut typed = Image::filled(left.base_type(), width, height, channels, 0.0);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    typed.set(x, y, c, out.get(x, y, c));
                }
            }
        }
        out = typed;
    }
    Ok(out)
}
