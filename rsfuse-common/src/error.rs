//! Common error types for rsfuse

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for rsfuse operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds shared across the fusion engine
///
/// Fatality is decided by the caller, not the variant: a `Config` error
/// aborts a task before any job runs, while an `Io` error during a write
/// only skips that one output.
#[derive(Error, Debug)]
pub enum Error {
    /// Inconsistent tags, dates or policy combination
    #[error("Configuration error: {0}")]
    Config(String),

    /// Image store miss on a key expected to exist (programming error)
    #[error("No image stored for tag '{tag}' at date {date}")]
    NotFound { tag: String, date: i64 },

    /// A requested prediction date has neither anchor role available
    #[error("No input available for prediction date {date}")]
    MissingInput { date: i64 },

    /// Load or write failure on a raster or sidecar file
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shape or base-type mismatch surfaced by the data model
    #[error("Invalid image: {0}")]
    InvalidImage(String),
}

impl Error {
    /// Build an `Io` error from a path and any error convertible to io::Error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
