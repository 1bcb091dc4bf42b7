//! In-memory raster model: typed pixel buffers, boolean masks, geo metadata
//!
//! **[IMG-MOD-010]** An `Image` is a 2D raster with a channel count and one
//! of a small set of per-channel base types. Pixel access goes through `f64`
//! so the engine's per-pixel logic is written once; integer base types round
//! and saturate on store.
//!
//! Masks are kept separate from images: a `Mask` is a boolean raster where
//! an *empty* mask means "no restriction", never "all invalid".

use crate::error::{Error, Result};
use crate::interval::IntervalSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-channel numeric encoding of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseType {
    U8,
    I16,
    U16,
    I32,
    F32,
    F64,
}

impl BaseType {
    pub fn is_integer(self) -> bool {
        !matches!(self, BaseType::F32 | BaseType::F64)
    }

    /// Smallest representable value of the base type
    pub fn min_value(self) -> f64 {
        match self {
            BaseType::U8 => u8::MIN as f64,
            BaseType::I16 => i16::MIN as f64,
            BaseType::U16 => u16::MIN as f64,
            BaseType::I32 => i32::MIN as f64,
            BaseType::F32 => f32::MIN as f64,
            BaseType::F64 => f64::MIN,
        }
    }

    /// Largest representable value of the base type
    pub fn max_value(self) -> f64 {
        match self {
            BaseType::U8 => u8::MAX as f64,
            BaseType::I16 => i16::MAX as f64,
            BaseType::U16 => u16::MAX as f64,
            BaseType::I32 => i32::MAX as f64,
            BaseType::F32 => f32::MAX as f64,
            BaseType::F64 => f64::MAX,
        }
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, BaseType::U8 | BaseType::U16)
    }
}

/// Typed pixel buffer backing an `Image`
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ImageData {
    fn len(&self) -> usize {
        match self {
            ImageData::U8(v) => v.len(),
            ImageData::I16(v) => v.len(),
            ImageData::U16(v) => v.len(),
            ImageData::I32(v) => v.len(),
            ImageData::F32(v) => v.len(),
            ImageData::F64(v) => v.len(),
        }
    }

    fn base_type(&self) -> BaseType {
        match self {
            ImageData::U8(_) => BaseType::U8,
            ImageData::I16(_) => BaseType::I16,
            ImageData::U16(_) => BaseType::U16,
            ImageData::I32(_) => BaseType::I32,
            ImageData::F32(_) => BaseType::F32,
            ImageData::F64(_) => BaseType::F64,
        }
    }
}

/// In-memory 2D raster with interleaved channels
///
/// Layout is row-major, channel-interleaved:
/// `index = (y * width + x) * channels + c`.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: usize,
    height: usize,
    channels: usize,
    data: ImageData,
}

impl Image {
    /// Create an image filled with a constant value
    pub fn filled(base: BaseType, width: usize, height: usize, channels: usize, value: f64) -> Self {
        let n = width * height * channels;
        let data = match base {
            BaseType::U8 => ImageData::U8(vec![clamp_to_u8(value); n]),
            BaseType::I16 => ImageData::I16(vec![clamp_to_i16(value); n]),
            BaseType::U16 => ImageData::U16(vec![clamp_to_u16(value); n]),
            BaseType::I32 => ImageData::I32(vec![clamp_to_i32(value); n]),
            BaseType::F32 => ImageData::F32(vec![value as f32; n]),
            BaseType::F64 => ImageData::F64(vec![value; n]),
        };
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Wrap an existing buffer; fails if the length does not match the shape
    pub fn from_data(
        width: usize,
        height: usize,
        channels: usize,
        data: ImageData,
    ) -> Result<Self> {
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(Error::InvalidImage(format!(
                "buffer length {} does not match {}x{}x{}",
                data.len(),
                width,
                height,
                channels
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn base_type(&self) -> BaseType {
        self.data.base_type()
    }

    pub fn data(&self) -> &ImageData {
        &self.data
    }

    pub fn same_shape(&self, other: &Image) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.channels == other.channels
    }

    #[inline]
    fn index(&self, x: usize, y: usize, c: usize) -> usize {
        debug_assert!(x < self.width && y < self.height && c < self.channels);
        (y * self.width + x) * self.channels + c
    }

    /// Read one sample as `f64`
    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f64 {
        let i = self.index(x, y, c);
        match &self.data {
            ImageData::U8(v) => v[i] as f64,
            ImageData::I16(v) => v[i] as f64,
            ImageData::U16(v) => v[i] as f64,
            ImageData::I32(v) => v[i] as f64,
            ImageData::F32(v) => v[i] as f64,
            ImageData::F64(v) => v[i],
        }
    }

    /// Store one sample; integer base types round and saturate
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: f64) {
        let i = self.index(x, y, c);
        match &mut self.data {
            ImageData::U8(v) => v[i] = clamp_to_u8(value),
            ImageData::I16(v) => v[i] = clamp_to_i16(value),
            ImageData::U16(v) => v[i] = clamp_to_u16(value),
            ImageData::I32(v) => v[i] = clamp_to_i32(value),
            ImageData::F32(v) => v[i] = value as f32,
            ImageData::F64(v) => v[i] = value,
        }
    }

    /// True if any sample equals `value` exactly
    pub fn contains_value(&self, value: f64) -> bool {
        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..self.channels {
                    if self.get(x, y, c) == value {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Replace every masked-invalid sample with `nodata` in place
    ///
    /// An empty mask means "no restriction": nothing is substituted.
    pub fn substitute_nodata(&mut self, mask: &Mask, nodata: f64) {
        if mask.is_unrestricted() {
            return;
        }
        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..self.channels {
                    if !mask.get(x, y, c) {
                        self.set(x, y, c, nodata);
                    }
                }
            }
        }
    }
}

/// Boolean validity raster
///
/// **[IMG-MSK-020]** The empty mask is the identity for AND-combination and
/// means "always valid". A single-channel mask broadcasts channel 0 over
/// any channel index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mask {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<bool>,
}

impl Mask {
    /// The empty mask: no restriction
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// A mask of the given shape filled with `value`
    pub fn filled(width: usize, height: usize, channels: usize, value: bool) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![value; width * height * channels],
        }
    }

    /// Interpret a raster as a boolean mask: nonzero samples are valid
    pub fn from_image(image: &Image) -> Self {
        let mut mask = Mask::filled(image.width(), image.height(), image.channels(), false);
        for y in 0..image.height() {
            for x in 0..image.width() {
                for c in 0..image.channels() {
                    mask.set(x, y, c, image.get(x, y, c) != 0.0);
                }
            }
        }
        mask
    }

    pub fn is_unrestricted(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Validity at a sample; channel 0 broadcasts for single-channel masks
    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> bool {
        if self.data.is_empty() {
            return true;
        }
        let c = if self.channels == 1 { 0 } else { c };
        self.data[(y * self.width + x) * self.channels + c]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: bool) {
        debug_assert!(!self.data.is_empty());
        let c = if self.channels == 1 { 0 } else { c };
        self.data[(y * self.width + x) * self.channels + c] = value;
    }

    /// Count of valid samples (0 for the unrestricted mask)
    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    /// Logical OR; the unrestricted mask (all valid) absorbs
    pub fn or_with(&self, other: &Mask) -> Mask {
        if self.is_unrestricted() || other.is_unrestricted() {
            return Mask::unrestricted();
        }
        let channels = self.channels.max(other.channels);
        let mut out = Mask::filled(self.width, self.height, channels, false);
        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..channels {
                    out.set(x, y, c, self.get(x, y, c) || other.get(x, y, c));
                }
            }
        }
        out
    }

    /// Logical AND; the unrestricted mask is the identity
    pub fn and_with(&self, other: &Mask) -> Mask {
        if self.is_unrestricted() {
            return other.clone();
        }
        if other.is_unrestricted() {
            return self.clone();
        }
        let channels = self.channels.max(other.channels);
        let mut out = Mask::filled(self.width, self.height, channels, true);
        for y in 0..self.height {
            for x in 0..self.width {
                for c in 0..channels {
                    out.set(x, y, c, self.get(x, y, c) && other.get(x, y, c));
                }
            }
        }
        out
    }
}

/// Georeference metadata carried alongside an image
///
/// The coordinate-reference entries are opaque to the engine; they are read
/// from and written back to JSON sidecars untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub base_type: BaseType,
    /// Sentinel value meaning "no data", excluded from valid ranges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodata: Option<f64>,
    /// Opaque coordinate reference metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl GeoInfo {
    /// Describe an image with no nodata and no CRS metadata
    pub fn for_image(image: &Image) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: image.channels(),
            base_type: image.base_type(),
            nodata: None,
            meta: BTreeMap::new(),
        }
    }
}

/// Pick a nodata sentinel absent from the image's values
///
/// **[IMG-NOD-030]** Candidates are tried in a fixed, base-type-dependent
/// order; returns `None` when every candidate collides with real data.
pub fn synthesize_nodata(image: &Image) -> Option<f64> {
    let base = image.base_type();
    let candidates: Vec<f64> = if base.is_unsigned() {
        vec![base.max_value(), 0.0]
    } else {
        vec![base.min_value(), base.max_value(), 0.0]
    };
    candidates
        .into_iter()
        .find(|&cand| !image.contains_value(cand))
}

/// Per-sample validity of an image against an interval set
///
/// A trivial (all-reals) set imposes no restriction and yields the
/// unrestricted mask.
pub fn range_mask(image: &Image, valid: &IntervalSet) -> Mask {
    if valid.is_all_reals() {
        return Mask::unrestricted();
    }
    let mut mask = Mask::filled(image.width(), image.height(), image.channels(), true);
    for y in 0..image.height() {
        for x in 0..image.width() {
            for c in 0..image.channels() {
                mask.set(x, y, c, valid.contains(image.get(x, y, c)));
            }
        }
    }
    mask
}

fn clamp_to_u8(v: f64) -> u8 {
    v.round().clamp(u8::MIN as f64, u8::MAX as f64) as u8
}

fn clamp_to_i16(v: f64) -> i16 {
    v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

fn clamp_to_u16(v: f64) -> u16 {
    v.round().clamp(u16::MIN as f64, u16::MAX as f64) as u16
}

fn clamp_to_i32(v: f64) -> i32 {
    v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::Interval;

    fn gray(values: &[f64], width: usize) -> Image {
        let height = values.len() / width;
        let mut img = Image::filled(BaseType::F64, width, height, 1, 0.0);
        for (i, v) in values.iter().enumerate() {
            img.set(i % width, i / width, 0, *v);
        }
        img
    }

    #[test]
    fn test_get_set_roundtrip() {
        let mut img = Image::filled(BaseType::U16, 4, 3, 2, 0.0);
        img.set(2, 1, 1, 1234.0);
        assert_eq!(img.get(2, 1, 1), 1234.0);
        assert_eq!(img.get(2, 1, 0), 0.0);
    }

    #[test]
    fn test_integer_store_rounds_and_saturates() {
        let mut img = Image::filled(BaseType::U8, 1, 1, 1, 0.0);
        img.set(0, 0, 0, 254.6);
        assert_eq!(img.get(0, 0, 0), 255.0);
        img.set(0, 0, 0, -10.0);
        assert_eq!(img.get(0, 0, 0), 0.0);
    }

    #[test]
    fn test_unrestricted_mask_is_and_identity() {
        let empty = Mask::unrestricted();
        let mut m = Mask::filled(2, 2, 1, true);
        m.set(1, 1, 0, false);
        assert_eq!(empty.and_with(&m), m);
        assert_eq!(m.and_with(&empty), m);
        assert!(empty.get(0, 0, 0), "empty mask means always valid");
    }

    #[test]
    fn test_or_combines_and_unrestricted_absorbs() {
        let mut a = Mask::filled(2, 1, 1, false);
        a.set(0, 0, 0, true);
        let mut b = Mask::filled(2, 1, 1, false);
        b.set(1, 0, 0, true);
        let or = a.or_with(&b);
        assert!(or.get(0, 0, 0));
        assert!(or.get(1, 0, 0));
        assert!(a.or_with(&Mask::unrestricted()).is_unrestricted());
    }

    #[test]
    fn test_single_channel_mask_broadcasts() {
        let mut m = Mask::filled(2, 1, 1, true);
        m.set(0, 0, 0, false);
        assert!(!m.get(0, 0, 2));
        assert!(m.get(1, 0, 5));
    }

    #[test]
    fn test_substitute_nodata_touches_only_invalid() {
        let mut img = gray(&[1.0, 2.0, 3.0, 4.0], 2);
        let mut mask = Mask::filled(2, 2, 1, true);
        mask.set(1, 0, 0, false);
        img.substitute_nodata(&mask, -9999.0);
        assert_eq!(img.get(0, 0, 0), 1.0);
        assert_eq!(img.get(1, 0, 0), -9999.0);
        assert_eq!(img.get(0, 1, 0), 3.0);
    }

    #[test]
    fn test_synthesize_nodata_skips_used_sentinels() {
        let img = gray(&[f64::MIN, 5.0, 7.0], 3);
        // min is taken, max is free
        assert_eq!(synthesize_nodata(&img), Some(f64::MAX));
    }

    #[test]
    fn test_synthesize_nodata_unsigned_order() {
        let img = Image::filled(BaseType::U8, 1, 1, 1, 12.0);
        assert_eq!(synthesize_nodata(&img), Some(255.0));
        let full = gray(&[0.0], 1);
        // f64 image using 0.0: falls through to min
        assert_eq!(synthesize_nodata(&full), Some(f64::MIN));
    }

    #[test]
    fn test_mask_from_image_nonzero_is_valid() {
        let img = gray(&[0.0, 1.0, 255.0, -1.0], 2);
        let mask = Mask::from_image(&img);
        assert!(!mask.get(0, 0, 0));
        assert!(mask.get(1, 0, 0));
        assert!(mask.get(0, 1, 0));
        assert!(mask.get(1, 1, 0));
    }

    #[test]
    fn test_range_mask_trivial_set_is_unrestricted() {
        let img = gray(&[1.0, 2.0], 2);
        assert!(range_mask(&img, &IntervalSet::all_reals()).is_unrestricted());
    }

    #[test]
    fn test_range_mask_tests_each_sample() {
        let img = gray(&[5.0, 99.0, 12.0], 3);
        let mut valid = IntervalSet::new();
        valid.union_with(Interval::closed(0.0, 10.0));
        let mask = range_mask(&img, &valid);
        assert!(mask.get(0, 0, 0));
        assert!(!mask.get(1, 0, 0));
        assert!(!mask.get(2, 0, 0));
    }
}
