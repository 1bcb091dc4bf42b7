//! Image loader/writer collaborators
//!
//! **[IOX-TRT-010]** The engine only ever talks to raster files through the
//! `ImageReader` / `ImageWriter` traits, so tests substitute in-memory
//! fakes and the orchestrator stays free of decode/encode concerns.
//!
//! **[IOX-FSI-020]** `FsImageIo` is the filesystem implementation: rasters
//! go through the `image` crate (8- and 16-bit grayscale or RGB), and the
//! georeference metadata the `image` formats cannot carry (nodata value,
//! coordinate reference entries) lives in a JSON sidecar next to each
//! raster (`scene.tif` + `scene.tif.json`). The loader is constructed with
//! an explicit data root; there is no process-global path state.

use rsfuse_common::image::{BaseType, GeoInfo, Image, ImageData};
use rsfuse_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Optional crop window applied at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Raster input collaborator
pub trait ImageReader {
    /// Load an image and its georeference; `channels` selects a subset of
    /// channels in the given order
    fn load(
        &self,
        path: &Path,
        crop: Option<CropRect>,
        channels: Option<&[usize]>,
    ) -> Result<(Image, GeoInfo)>;
}

/// Raster output collaborator
pub trait ImageWriter {
    fn write(&self, image: &Image, geo: &GeoInfo, path: &Path) -> Result<()>;
}

/// Filesystem reader/writer over the `image` crate with JSON sidecars
#[derive(Debug, Clone)]
pub struct FsImageIo {
    data_root: PathBuf,
}

impl FsImageIo {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }

    fn sidecar_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".json");
        path.with_file_name(name)
    }

    fn read_sidecar(path: &Path) -> Result<Option<GeoInfo>> {
        let sidecar = Self::sidecar_path(path);
        if !sidecar.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&sidecar).map_err(|e| Error::io(&sidecar, e))?;
        let geo: GeoInfo = serde_json::from_str(&text)
            .map_err(|e| Error::InvalidImage(format!("{}: {}", sidecar.display(), e)))?;
        Ok(Some(geo))
    }

    fn write_sidecar(path: &Path, geo: &GeoInfo) -> Result<()> {
        let sidecar = Self::sidecar_path(path);
        let text = serde_json::to_string_pretty(geo)
            .map_err(|e| Error::InvalidImage(format!("sidecar encode: {}", e)))?;
        std::fs::write(&sidecar, text).map_err(|e| Error::io(&sidecar, e))
    }
}

impl ImageReader for FsImageIo {
    fn load(
        &self,
        path: &Path,
        crop: Option<CropRect>,
        channels: Option<&[usize]>,
    ) -> Result<(Image, GeoInfo)> {
        let full_path = self.resolve(path);
        let decoded = image::open(&full_path).map_err(|e| {
            Error::io(
                &full_path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })?;

        let mut img = decode_to_image(decoded)?;
        if let Some(rect) = crop {
            img = crop_image(&img, rect)?;
        }
        if let Some(selection) = channels {
            img = select_channels(&img, selection)?;
        }

        let geo = match Self::read_sidecar(&full_path)? {
            Some(mut geo) => {
                // The raster is authoritative for shape; the sidecar
                // contributes nodata and CRS metadata
                geo.width = img.width();
                geo.height = img.height();
                geo.channels = img.channels();
                geo.base_type = img.base_type();
                geo
            }
            None => GeoInfo::for_image(&img),
        };
        debug!(path = %full_path.display(), width = img.width(), height = img.height(),
               channels = img.channels(), nodata = ?geo.nodata, "Loaded raster");
        Ok((img, geo))
    }
}

impl ImageWriter for FsImageIo {
    fn write(&self, img: &Image, geo: &GeoInfo, path: &Path) -> Result<()> {
        let full_path = self.resolve(path);
        if let Some(parent) = full_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
        }
        encode_image(img, &full_path)?;
        Self::write_sidecar(&full_path, geo)?;
        debug!(path = %full_path.display(), "Wrote raster");
        Ok(())
    }
}

fn decode_to_image(decoded: image::DynamicImage) -> Result<Image> {
    use image::DynamicImage;
    let (width, height) = (decoded.width() as usize, decoded.height() as usize);
    let (channels, data) = match decoded {
        DynamicImage::ImageLuma8(buf) => (1, ImageData::U8(buf.into_raw())),
        DynamicImage::ImageRgb8(buf) => (3, ImageData::U8(buf.into_raw())),
        DynamicImage::ImageLuma16(buf) => (1, ImageData::U16(buf.into_raw())),
        DynamicImage::ImageRgb16(buf) => (3, ImageData::U16(buf.into_raw())),
        other => {
            warn!("Unusual raster layout, converting to 16-bit RGB");
            (3, ImageData::U16(other.into_rgb16().into_raw()))
        }
    };
    Image::from_data(width, height, channels, data)
}

fn encode_image(img: &Image, path: &Path) -> Result<()> {
    let io_err = |e: image::ImageError| Error::io(path, std::io::Error::other(e));
    let width = img.width() as u32;
    let height = img.height() as u32;
    match (img.base_type(), img.channels(), img.data()) {
        (BaseType::U8, 1, ImageData::U8(data)) => {
            image::GrayImage::from_raw(width, height, data.clone())
                .expect("buffer length matches shape")
                .save(path)
                .map_err(io_err)?;
        }
        (BaseType::U8, 3, ImageData::U8(data)) => {
            image::RgbImage::from_raw(width, height, data.clone())
                .expect("buffer length matches shape")
                .save(path)
                .map_err(io_err)?;
        }
        (BaseType::U16, 1, ImageData::U16(data)) => {
            image::ImageBuffer::<image::Luma<u16>, _>::from_raw(width, height, data.clone())
                .expect("buffer length matches shape")
                .save(path)
                .map_err(io_err)?;
        }
        (BaseType::U16, 3, ImageData::U16(data)) => {
            image::ImageBuffer::<image::Rgb<u16>, _>::from_raw(width, height, data.clone())
                .expect("buffer length matches shape")
                .save(path)
                .map_err(io_err)?;
        }
        (base, channels, _) => {
            return Err(Error::InvalidImage(format!(
                "cannot encode {:?} with {} channel(s) through the raster backend",
                base, channels
            )));
        }
    }
    Ok(())
}

fn crop_image(img: &Image, rect: CropRect) -> Result<Image> {
    if rect.x + rect.width > img.width() || rect.y + rect.height > img.height() {
        return Err(Error::InvalidImage(format!(
            "crop {:?} exceeds raster {}x{}",
            rect,
            img.width(),
            img.height()
        )));
    }
    let mut out = Image::filled(
        img.base_type(),
        rect.width,
        rect.height,
        img.channels(),
        0.0,
    );
    for y in 0..rect.height {
        for x in 0..rect.width {
            for c in 0..img.channels() {
                out.set(x, y, c, img.get(rect.x + x, rect.y + y, c));
            }
        }
    }
    Ok(out)
}

fn select_channels(img: &Image, selection: &[usize]) -> Result<Image> {
    for &c in selection {
        if c >= img.channels() {
            return Err(Error::InvalidImage(format!(
                "channel {} out of range (raster has {})",
                c,
                img.channels()
            )));
        }
    }
    let mut out = Image::filled(
        img.base_type(),
        img.width(),
        img.height(),
        selection.len(),
        0.0,
    );
    for y in 0..img.height() {
        for x in 0..img.width() {
            for (i, &c) in selection.iter().enumerate() {
                out.set(x, y, i, img.get(x, y, c));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn checkerboard() -> Image {
        let mut img = Image::filled(BaseType::U8, 4, 4, 1, 0.0);
        for y in 0..4 {
            for x in 0..4 {
                img.set(x, y, 0, if (x + y) % 2 == 0 { 200.0 } else { 10.0 });
            }
        }
        img
    }

    #[test]
    fn test_write_then_load_roundtrip_with_sidecar() {
        let dir = TempDir::new().unwrap();
        let io = FsImageIo::new(dir.path());
        let img = checkerboard();
        let mut geo = GeoInfo::for_image(&img);
        geo.nodata = Some(255.0);
        geo.meta.insert("crs".to_string(), "EPSG:32633".to_string());

        io.write(&img, &geo, Path::new("scene.png")).unwrap();
        let (loaded, loaded_geo) = io.load(Path::new("scene.png"), None, None).unwrap();

        assert_eq!(loaded, img);
        assert_eq!(loaded_geo.nodata, Some(255.0));
        assert_eq!(loaded_geo.meta.get("crs").unwrap(), "EPSG:32633");
    }

    #[test]
    fn test_load_without_sidecar_derives_geo() {
        let dir = TempDir::new().unwrap();
        let io = FsImageIo::new(dir.path());
        let img = checkerboard();
        let raster_path = dir.path().join("plain.png");
        image::GrayImage::from_raw(4, 4, match img.data() {
            ImageData::U8(d) => d.clone(),
            _ => unreachable!(),
        })
        .unwrap()
        .save(&raster_path)
        .unwrap();

        let (loaded, geo) = io.load(Path::new("plain.png"), None, None).unwrap();
        assert_eq!(loaded.width(), 4);
        assert!(geo.nodata.is_none());
        assert_eq!(geo.base_type, BaseType::U8);
    }

    #[test]
    fn test_crop_and_channel_selection() {
        let mut img = Image::filled(BaseType::U8, 3, 3, 3, 0.0);
        for c in 0..3 {
            img.set(1, 1, c, (10 * (c + 1)) as f64);
        }
        let cropped = crop_image(
            &img,
            CropRect {
                x: 1,
                y: 1,
                width: 2,
                height: 2,
            },
        )
        .unwrap();
        assert_eq!(cropped.width(), 2);
        assert_eq!(cropped.get(0, 0, 1), 20.0);

        let selected = select_channels(&cropped, &[2, 0]).unwrap();
        assert_eq!(selected.channels(), 2);
        assert_eq!(selected.get(0, 0, 0), 30.0);
        assert_eq!(selected.get(0, 0, 1), 10.0);
    }

    #[test]
    fn test_crop_out_of_bounds_fails() {
        let img = checkerboard();
        let err = crop_image(
            &img,
            CropRect {
                x: 3,
                y: 0,
                width: 2,
                height: 2,
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[test]
    fn test_missing_raster_is_io_error() {
        let dir = TempDir::new().unwrap();
        let io = FsImageIo::new(dir.path());
        let err = io.load(Path::new("absent.png"), None, None).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_unencodable_base_type_fails() {
        let dir = TempDir::new().unwrap();
        let io = FsImageIo::new(dir.path());
        let img = Image::filled(BaseType::F64, 2, 2, 1, 1.5);
        let geo = GeoInfo::for_image(&img);
        let err = io.write(&img, &geo, Path::new("bad.png")).unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }
}
