//! Test infrastructure for orchestrator integration tests
//!
//! Provides synthetic scene construction and in-memory reader/writer
//! collaborators so a full task can run without touching the filesystem.

use rsfuse_common::image::{BaseType, GeoInfo, Image};
use rsfuse_common::types::{
    Date, DictionaryReuse, ExistingPolicy, OutlierPolicy,
};
use rsfuse_common::{Error, Result};
use rsfuse_engine::io::{CropRect, ImageReader, ImageWriter};
use rsfuse_engine::mask::MaskSpec;
use rsfuse_engine::TaskInputs;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const WIDTH: usize = 4;
pub const HEIGHT: usize = 3;

/// Uniform single-channel F32 image
pub fn uniform(value: f64) -> Image {
    Image::filled(BaseType::F32, WIDTH, HEIGHT, 1, value)
}

pub fn high_path(date: Date) -> PathBuf {
    PathBuf::from(format!("high_{date}.tif"))
}

pub fn low_path(date: Date) -> PathBuf {
    PathBuf::from(format!("low_{date}.tif"))
}

pub fn out_path(date: Date) -> PathBuf {
    PathBuf::from(format!("out_{date}.tif"))
}

/// In-memory raster source keyed by path, with optional failure injection
pub struct MockReader {
    rasters: HashMap<PathBuf, (Image, GeoInfo)>,
    fail: HashSet<PathBuf>,
}

impl MockReader {
    /// Scene where every image's pixel value equals its date, so linear
    /// interpolation between anchors at dates l and r yields exactly the
    /// predicted date
    pub fn scene(high_dates: &[Date], low_dates: &[Date]) -> Self {
        let mut rasters = HashMap::new();
        for &d in high_dates {
            let img = uniform(d as f64);
            let geo = GeoInfo::for_image(&img);
            rasters.insert(high_path(d), (img, geo));
        }
        for &d in low_dates {
            let img = uniform(d as f64);
            let geo = GeoInfo::for_image(&img);
            rasters.insert(low_path(d), (img, geo));
        }
        Self {
            rasters,
            fail: HashSet::new(),
        }
    }

    pub fn fail_on(mut self, path: PathBuf) -> Self {
        self.fail.insert(path);
        self
    }

    /// Register an extra raster (e.g. an external mask image)
    pub fn with_raster(mut self, path: PathBuf, img: Image) -> Self {
        let geo = GeoInfo::for_image(&img);
        self.rasters.insert(path, (img, geo));
        self
    }
}

impl ImageReader for MockReader {
    fn load(
        &self,
        path: &Path,
        _crop: Option<CropRect>,
        _channels: Option<&[usize]>,
    ) -> Result<(Image, GeoInfo)> {
        if self.fail.contains(path) {
            return Err(Error::io(
                path,
                std::io::Error::other("injected read failure"),
            ));
        }
        self.rasters
            .get(path)
            .cloned()
            .ok_or_else(|| {
                Error::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such raster"),
                )
            })
    }
}

/// Captures every write in memory, with optional failure injection
#[derive(Clone, Default)]
pub struct RecordingWriter {
    pub written: Arc<Mutex<BTreeMap<PathBuf, (Image, GeoInfo)>>>,
    fail: HashSet<PathBuf>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(mut self, path: PathBuf) -> Self {
        self.fail.insert(path);
        self
    }

    pub fn image_at(&self, path: &Path) -> Option<Image> {
        self.written
            .lock()
            .unwrap()
            .get(path)
            .map(|(img, _)| img.clone())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.written.lock().unwrap().keys().cloned().collect()
    }
}

impl ImageWriter for RecordingWriter {
    fn write(&self, image: &Image, geo: &GeoInfo, path: &Path) -> Result<()> {
        if self.fail.contains(path) {
            return Err(Error::io(
                path,
                std::io::Error::other("injected write failure"),
            ));
        }
        self.written
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), (image.clone(), geo.clone()));
        Ok(())
    }
}

/// Unrestricted-mask task inputs over the synthetic path scheme
pub fn basic_inputs(high_dates: &[Date], low_dates: &[Date], predict: &[Date]) -> TaskInputs {
    TaskInputs {
        high_tag: "high".to_string(),
        low_tag: "low".to_string(),
        high: high_dates.iter().map(|&d| (d, high_path(d))).collect(),
        low: low_dates.iter().map(|&d| (d, low_path(d))).collect(),
        high_mask_rasters: BTreeMap::new(),
        low_mask_rasters: BTreeMap::new(),
        outputs: predict.iter().map(|&d| (d, out_path(d))).collect(),
        state_outputs: BTreeMap::new(),
        high_mask: MaskSpec::unrestricted(),
        low_mask: MaskSpec::unrestricted(),
        outlier_policy: OutlierPolicy::Mixed,
        existing_policy: ExistingPolicy::Ignore,
        prefer_fill_over_nodata: false,
        workers: 1,
        dictionary_path: None,
        dictionary_reuse: DictionaryReuse::Clear,
    }
}
