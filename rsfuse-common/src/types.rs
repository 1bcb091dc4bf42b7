//! Core identifiers and policy enums for the fusion engine
//!
//! Dates are plain integer time indices; ordering is the only semantics the
//! engine relies on (no calendar arithmetic). Resolution tags are opaque
//! strings distinguishing the "high" and "low" image roles.

use serde::{Deserialize, Serialize};

/// Integer time index; ordering is the only semantics used
pub type Date = i64;

/// Opaque label distinguishing image resolution roles
pub type ResolutionTag = String;

/// Unique identity of an image in the store: (resolution tag, date)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub tag: ResolutionTag,
    pub date: Date,
}

impl ImageKey {
    pub fn new(tag: impl Into<ResolutionTag>, date: Date) -> Self {
        Self {
            tag: tag.into(),
            date,
        }
    }
}

/// Policy for prediction dates outside the anchored span
///
/// **[JOB-POL-010]**
/// - `Ignore`: outlier dates produce no job
/// - `Mixed`: outliers become single-anchor jobs at the nearest pair date;
///   between-pair dates stay double-anchor
/// - `All`: every date is reassigned to single-anchor mode at its nearest
///   pair date (ties broken toward the lower date)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutlierPolicy {
    Ignore,
    #[default]
    Mixed,
    All,
}

/// Policy for requested dates where a high-resolution image already exists
///
/// **[JOB-POL-020]**
/// - `Ignore`: skip the date
/// - `Copy`: copy the existing high-resolution image verbatim to the output
/// - `Force`: run the fusion algorithm predicting the image from itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExistingPolicy {
    #[default]
    Ignore,
    Copy,
    Force,
}

/// Reuse mode for algorithms that persist a trained model between tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DictionaryReuse {
    /// Start fresh, persist the trained state at task end
    #[default]
    Clear,
    /// Restore existing state, continue training, persist at task end
    Improve,
    /// Restore existing state and skip per-job training
    Use,
}

/// Per-pixel, per-channel outcome classification
///
/// **[PXS-TAB-010]** Produced as a diagnostic byproduct of each prediction;
/// the `u8` codes are stable because state rasters are written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelState {
    /// Invalid before and after; never touched
    Nodata,
    /// Needed filling but no replacement was found
    NonInterpolated,
    /// Successfully filled by prediction or interpolation
    Interpolated,
    /// Valid and untouched
    Clear,
}

impl PixelState {
    /// Stable on-disk code for state rasters
    pub fn code(self) -> u8 {
        match self {
            PixelState::Nodata => 0,
            PixelState::NonInterpolated => 1,
            PixelState::Interpolated => 2,
            PixelState::Clear => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_state_codes_are_stable() {
        assert_eq!(PixelState::Nodata.code(), 0);
        assert_eq!(PixelState::NonInterpolated.code(), 1);
        assert_eq!(PixelState::Interpolated.code(), 2);
        assert_eq!(PixelState::Clear.code(), 3);
    }

    #[test]
    fn test_policy_serde_names() {
        let p: OutlierPolicy = toml::from_str::<toml::Value>("v = \"mixed\"")
            .unwrap()
            .get("v")
            .unwrap()
            .clone()
            .try_into()
            .unwrap();
        assert_eq!(p, OutlierPolicy::Mixed);
    }
}
