//! Mask Composition Pipeline
//!
//! **[MSK-CMP-010]** Turns raw mask images, declared nodata values and
//! ordered valid/invalid range rules into one boolean mask per image. The
//! anchor-pair mask and a prediction date's own mask are combined only at
//! the point a specific image is evaluated, never eagerly globally, since
//! later jobs reuse a different combination of dates.

use rsfuse_common::config::{build_valid_set, MaskRules};
use rsfuse_common::image::{range_mask, GeoInfo, Image, Mask};
use rsfuse_common::interval::{Interval, IntervalSet};
use tracing::trace;

/// Resolved mask policy for one image role
///
/// Built once per task from the role's `MaskRules`; the valid set already
/// reflects the declaration order of the rules.
#[derive(Debug, Clone)]
pub struct MaskSpec {
    valid: IntervalSet,
    exclude_nodata: bool,
    fill: IntervalSet,
}

impl MaskSpec {
    pub fn from_rules(rules: &MaskRules) -> Self {
        let fill = if rules.fill_ranges.is_empty() {
            IntervalSet::new()
        } else {
            build_valid_set(&rules.fill_ranges)
        };
        Self {
            valid: build_valid_set(&rules.ranges),
            exclude_nodata: rules.exclude_nodata,
            fill,
        }
    }

    /// A spec imposing no restriction and no fill layer
    pub fn unrestricted() -> Self {
        Self {
            valid: IntervalSet::all_reals(),
            exclude_nodata: true,
            fill: IntervalSet::new(),
        }
    }

    pub fn valid_set(&self) -> &IntervalSet {
        &self.valid
    }

    /// True if the role declares a "needs filling" value layer
    pub fn has_fill_layer(&self) -> bool {
        !self.fill.is_empty()
    }
}

/// Compose the validity mask for one image
///
/// **[MSK-CMP-020]** Steps:
/// 1. Start from `base` (possibly unrestricted).
/// 2. If the spec excludes nodata and `geo` declares one, subtract the
///    singleton `[nodata, nodata]` from the effective valid set.
/// 3. Narrow the set to the image's representable range for integer base
///    types, then AND `base` with the per-sample range test, unless the
///    effective set imposes no restriction.
pub fn compose_mask(base: &Mask, image: &Image, spec: &MaskSpec, geo: &GeoInfo) -> Mask {
    let mut valid = spec.valid.clone();
    if spec.exclude_nodata {
        if let Some(nodata) = geo.nodata {
            valid.subtract(Interval::singleton(nodata));
        }
    }
    let base_type = image.base_type();
    if base_type.is_integer() {
        valid = valid.narrowed_to_integer_range(base_type.min_value(), base_type.max_value());
        // Narrowing an unrestricted set yields the full representable
        // range, which still restricts nothing for this image
        let full = {
            let mut s = IntervalSet::new();
            s.union_with(Interval::closed(base_type.min_value(), base_type.max_value()));
            s
        };
        if valid == full {
            trace!("Mask restricts nothing for this base type");
            return base.clone();
        }
    } else if valid.is_all_reals() {
        return base.clone();
    }
    base.and_with(&range_mask(image, &valid))
}

/// Per-sample "needs filling" layer for one image
///
/// `None` when the role declares no fill layer, so callers never confuse
/// "no layer" with the unrestricted validity mask.
pub fn fill_mask(image: &Image, spec: &MaskSpec) -> Option<Mask> {
    if !spec.has_fill_layer() {
        return None;
    }
    Some(range_mask(image, &spec.fill))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsfuse_common::config::{RangeKind, RangeRule};
    use rsfuse_common::image::BaseType;

    fn rules(ranges: Vec<RangeRule>) -> MaskRules {
        MaskRules {
            ranges,
            exclude_nodata: true,
            fill_ranges: vec![],
        }
    }

    fn valid_range(min: f64, max: f64) -> RangeRule {
        RangeRule {
            kind: RangeKind::Valid,
            min: Some(min),
            max: Some(max),
            min_open: false,
            max_open: false,
        }
    }

    fn row(values: &[f64]) -> Image {
        let mut img = Image::filled(BaseType::F64, values.len(), 1, 1, 0.0);
        for (x, v) in values.iter().enumerate() {
            img.set(x, 0, 0, *v);
        }
        img
    }

    #[test]
    fn test_nodata_and_range_composition() {
        // base empty, values [5, 99, 12], valid [0,10], nodata 99 excluded
        let img = row(&[5.0, 99.0, 12.0]);
        let mut geo = GeoInfo::for_image(&img);
        geo.nodata = Some(99.0);
        let spec = MaskSpec::from_rules(&rules(vec![valid_range(0.0, 10.0)]));
        let mask = compose_mask(&Mask::unrestricted(), &img, &spec, &geo);
        assert!(mask.get(0, 0, 0));
        assert!(!mask.get(1, 0, 0));
        assert!(!mask.get(2, 0, 0));
    }

    #[test]
    fn test_nodata_inside_valid_range_is_excluded() {
        let img = row(&[99.0, 50.0]);
        let mut geo = GeoInfo::for_image(&img);
        geo.nodata = Some(99.0);
        let spec = MaskSpec::from_rules(&rules(vec![valid_range(0.0, 200.0)]));
        let mask = compose_mask(&Mask::unrestricted(), &img, &spec, &geo);
        assert!(!mask.get(0, 0, 0));
        assert!(mask.get(1, 0, 0));
    }

    #[test]
    fn test_no_rules_and_no_nodata_restricts_nothing() {
        let img = row(&[1.0, 2.0]);
        let geo = GeoInfo::for_image(&img);
        let spec = MaskSpec::from_rules(&rules(vec![]));
        let mask = compose_mask(&Mask::unrestricted(), &img, &spec, &geo);
        assert!(mask.is_unrestricted());
    }

    #[test]
    fn test_base_mask_is_anded_not_replaced() {
        let img = row(&[5.0, 5.0]);
        let geo = GeoInfo::for_image(&img);
        let spec = MaskSpec::from_rules(&rules(vec![valid_range(0.0, 10.0)]));
        let mut base = Mask::filled(2, 1, 1, true);
        base.set(0, 0, 0, false);
        let mask = compose_mask(&base, &img, &spec, &geo);
        assert!(!mask.get(0, 0, 0), "base invalidity must be kept");
        assert!(mask.get(1, 0, 0));
    }

    #[test]
    fn test_integer_image_narrows_user_range() {
        // Open range (0.5, 2.5) over u8 integers is [1, 2]
        let mut img = Image::filled(BaseType::U8, 3, 1, 1, 0.0);
        img.set(1, 0, 0, 1.0);
        img.set(2, 0, 0, 3.0);
        let geo = GeoInfo::for_image(&img);
        let spec = MaskSpec::from_rules(&rules(vec![RangeRule {
            kind: RangeKind::Valid,
            min: Some(0.5),
            max: Some(2.5),
            min_open: true,
            max_open: true,
        }]));
        let mask = compose_mask(&Mask::unrestricted(), &img, &spec, &geo);
        assert!(!mask.get(0, 0, 0));
        assert!(mask.get(1, 0, 0));
        assert!(!mask.get(2, 0, 0));
    }

    #[test]
    fn test_unrestricted_set_on_integer_image_stays_unrestricted() {
        let img = Image::filled(BaseType::U8, 2, 1, 1, 7.0);
        let geo = GeoInfo::for_image(&img);
        let spec = MaskSpec::unrestricted();
        let mask = compose_mask(&Mask::unrestricted(), &img, &spec, &geo);
        assert!(mask.is_unrestricted());
    }

    #[test]
    fn test_fill_mask_flags_configured_values() {
        let img = row(&[2.0, 5.0]);
        let mask_rules = MaskRules {
            ranges: vec![],
            exclude_nodata: true,
            fill_ranges: vec![valid_range(2.0, 2.0)],
        };
        let spec = MaskSpec::from_rules(&mask_rules);
        let fill = fill_mask(&img, &spec).expect("fill layer configured");
        assert!(fill.get(0, 0, 0));
        assert!(!fill.get(1, 0, 0));
    }

    #[test]
    fn test_no_fill_layer_flags_nothing() {
        let img = row(&[2.0]);
        let spec = MaskSpec::from_rules(&rules(vec![]));
        assert!(!spec.has_fill_layer());
        assert!(fill_mask(&img, &spec).is_none());
    }
}
