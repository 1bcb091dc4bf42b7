//! Resolution-Tagged Image Store
//!
//! **[STO-KEY-010]** Keyed cache of images by (resolution tag, date); at
//! most one image per key. The store performs no I/O itself; population is
//! always via `set`, driven by the orchestrator calling the external loader.
//!
//! **[STO-EVI-020]** Eviction is caller-driven and deterministic: after a
//! job finishes, the orchestrator removes every key no later job will read,
//! which bounds peak memory to one job's working set rather than the whole
//! date series.

use rsfuse_common::image::Image;
use rsfuse_common::types::{Date, ResolutionTag};
use rsfuse_common::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Lazily-populated, explicitly-evicted image cache
#[derive(Debug, Default)]
pub struct ImageStore {
    images: HashMap<ResolutionTag, BTreeMap<Date, Image>>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if an image is stored under (tag, date)
    pub fn has(&self, tag: &str, date: Date) -> bool {
        self.images
            .get(tag)
            .is_some_and(|dates| dates.contains_key(&date))
    }

    /// Borrow the image at (tag, date); a miss is the caller's bug
    pub fn get(&self, tag: &str, date: Date) -> Result<&Image> {
        self.images
            .get(tag)
            .and_then(|dates| dates.get(&date))
            .ok_or_else(|| Error::NotFound {
                tag: tag.to_string(),
                date,
            })
    }

    /// Store an image, overwriting any previous image under the key
    pub fn set(&mut self, tag: impl Into<ResolutionTag>, date: Date, image: Image) {
        let tag = tag.into();
        debug!(tag = %tag, date, "Store set");
        self.images.entry(tag).or_default().insert(date, image);
    }

    /// Release ownership of the image at (tag, date)
    ///
    /// Removing an absent key is a programming error and fails with
    /// `NotFound` rather than being silently ignored.
    pub fn remove(&mut self, tag: &str, date: Date) -> Result<Image> {
        let image = self
            .images
            .get_mut(tag)
            .and_then(|dates| dates.remove(&date))
            .ok_or_else(|| Error::NotFound {
                tag: tag.to_string(),
                date,
            })?;
        debug!(tag = %tag, date, "Store evict");
        if self.images.get(tag).is_some_and(|d| d.is_empty()) {
            self.images.remove(tag);
        }
        Ok(image)
    }

    /// Sorted dates currently stored under a tag
    pub fn dates(&self, tag: &str) -> Vec<Date> {
        self.images
            .get(tag)
            .map(|dates| dates.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Total number of stored images, across all tags
    pub fn len(&self) -> usize {
        self.images.values().map(|dates| dates.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsfuse_common::image::BaseType;

    fn img(value: f64) -> Image {
        Image::filled(BaseType::U8, 2, 2, 1, value)
    }

    #[test]
    fn test_set_then_get_returns_value() {
        let mut store = ImageStore::new();
        store.set("high", 5, img(7.0));
        assert!(store.has("high", 5));
        assert_eq!(store.get("high", 5).unwrap().get(0, 0, 0), 7.0);
    }

    #[test]
    fn test_get_absent_key_is_not_found() {
        let store = ImageStore::new();
        let err = store.get("high", 1).unwrap_err();
        assert!(matches!(err, Error::NotFound { date: 1, .. }), "got {:?}", err);
    }

    #[test]
    fn test_remove_releases_key() {
        let mut store = ImageStore::new();
        store.set("low", 3, img(1.0));
        store.remove("low", 3).unwrap();
        assert!(!store.has("low", 3));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_absent_key_is_not_found() {
        let mut store = ImageStore::new();
        assert!(store.remove("low", 3).is_err());
        store.set("low", 3, img(1.0));
        store.remove("low", 3).unwrap();
        assert!(store.remove("low", 3).is_err());
    }

    #[test]
    fn test_set_overwrites() {
        let mut store = ImageStore::new();
        store.set("low", 3, img(1.0));
        store.set("low", 3, img(2.0));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("low", 3).unwrap().get(0, 0, 0), 2.0);
    }

    #[test]
    fn test_dates_are_sorted() {
        let mut store = ImageStore::new();
        for date in [9, 1, 5] {
            store.set("low", date, img(0.0));
        }
        assert_eq!(store.dates("low"), vec![1, 5, 9]);
        assert!(store.dates("high").is_empty());
    }
}
