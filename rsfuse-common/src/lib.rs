//! Shared types for the rsfuse workspace
//!
//! Holds the data model (images, masks, geo metadata), the interval-set
//! algebra, the task configuration model, and the common error type used
//! across the fusion engine.

pub mod config;
pub mod error;
pub mod image;
pub mod interval;
pub mod types;

pub use crate::error::{Error, Result};
