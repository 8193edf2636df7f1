//! Download jobs: the entity, its state machine and the in-memory registry.
//!
//! # Overview
//!
//! - [`DownloadJob`] - a single download and its counters
//! - [`JobStatus`] - lifecycle states
//! - [`JobEvent`] - events that move a job between states
//! - [`JobRegistry`] - lock-guarded ordered collection of jobs

mod model;
mod registry;
mod state;

pub use model::{DownloadJob, JobId, JobStatus, format_bytes};
pub use registry::JobRegistry;
pub use state::{InvalidTransition, JobEvent};
