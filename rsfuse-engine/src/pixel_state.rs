//! Pixel State Classifier
//!
//! **[PXS-TAB-010]** Per pixel/channel diagnostic of each prediction:
//!
//! | was valid | needs filling | outcome |
//! |---|---|---|
//! | no  | any | `Nodata` (never touched) |
//! | yes | no  | `Clear` |
//! | yes | yes | `Interpolated` if a replacement was found, else `NonInterpolated` |
//!
//! **[PXS-POL-020]** `prefer_fill_over_nodata` decides the invalid+flagged
//! corner: when true the pixel is treated as fillable anyway; when false it
//! stays `Nodata` and is never filled.

use rsfuse_common::image::{BaseType, Image, Mask};
use rsfuse_common::types::PixelState;

/// Classify one pixel/channel outcome
pub fn classify(
    was_valid: bool,
    needs_fill: bool,
    replacement_found: bool,
    prefer_fill_over_nodata: bool,
) -> PixelState {
    if !was_valid && !(needs_fill && prefer_fill_over_nodata) {
        return PixelState::Nodata;
    }
    if !needs_fill && was_valid {
        return PixelState::Clear;
    }
    if replacement_found {
        PixelState::Interpolated
    } else {
        PixelState::NonInterpolated
    }
}

/// Build a state raster for one prediction
///
/// `valid` is the composed validity mask, `fill` the "needs filling" layer
/// (`None` when the role declares no such layer), and `filled` marks the
/// samples the algorithm actually produced (the unrestricted mask means
/// "everything produced").
pub fn state_raster(
    width: usize,
    height: usize,
    channels: usize,
    valid: &Mask,
    fill: Option<&Mask>,
    filled: &Mask,
    prefer_fill_over_nodata: bool,
) -> Image {
    let mut out = Image::filled(BaseType::U8, width, height, channels, 0.0);
    for y in 0..height {
        for x in 0..width {
            for c in 0..channels {
                let state = classify(
                    valid.get(x, y, c),
                    fill.is_some_and(|f| f.get(x, y, c)),
                    filled.get(x, y, c),
                    prefer_fill_over_nodata,
                );
                out.set(x, y, c, state.code() as f64);
            }
        }
    }
    out
}
