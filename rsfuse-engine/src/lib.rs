//! rsfuse-engine library interface
//!
//! Fuses time-series remote-sensing imagery: given sparse dates where both a
//! high- and a low-resolution image exist and a denser low-resolution-only
//! series, the engine predicts synthetic high-resolution images at the
//! missing dates. The library surface exposes the job decomposition, the
//! resolution-tagged image store, mask composition, and the orchestrator so
//! integration tests can drive them with mock collaborators.

pub mod algorithm;
pub mod events;
pub mod io;
pub mod jobs;
pub mod mask;
pub mod orchestrator;
pub mod pixel_state;
pub mod scan;
pub mod store;

pub use crate::algorithm::{FusionAlgorithm, PredictContext, Prediction};
pub use crate::events::TaskEvent;
pub use crate::orchestrator::{Orchestrator, TaskInputs, TaskReport};
pub use crate::store::ImageStore;

pub use rsfuse_common::{Error, Result};
