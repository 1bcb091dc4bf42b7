//! Dated raster discovery
//!
//! **[SCN-DIR-010]** Recursive collection of `(path, date)` entries from a
//! directory tree, for task files that point at a directory instead of
//! listing every raster. The date is the trailing run of digits in the file
//! stem (`high_012.tif` is date 12).

use rsfuse_common::config::ImageEntry;
use rsfuse_common::types::Date;
use rsfuse_common::{Error, Result};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Extensions the filesystem loader can decode
const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff", "png", "jpg", "jpeg"];

/// Collect dated raster entries under `root`, sorted by date
///
/// Files without a recognized extension or without a trailing date index
/// are skipped with a log line. Duplicate dates are kept; task validation
/// rejects them with the offending paths visible.
pub fn scan_dated_rasters(root: &Path) -> Result<Vec<ImageEntry>> {
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Error accessing entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let is_raster = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| RASTER_EXTENSIONS.contains(&e.to_lowercase().as_str()));
        if !is_raster {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match date_from_stem(stem) {
            Some(date) => entries.push(ImageEntry {
                path: path.to_path_buf(),
                date,
                mask: None,
            }),
            None => debug!(path = %path.display(), "No date index in file stem, skipped"),
        }
    }

    entries.sort_by_key(|e| e.date);
    for pair in entries.windows(2) {
        if pair[0].date == pair[1].date {
            warn!(
                date = pair[0].date,
                "Duplicate date: {} and {}",
                pair[0].path.display(),
                pair[1].path.display()
            );
        }
    }
    debug!(count = entries.len(), root = %root.display(), "Raster scan complete");
    Ok(entries)
}

/// Trailing run of digits in a file stem, as a date index
fn date_from_stem(stem: &str) -> Option<Date> {
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<Date>().ok()
}
