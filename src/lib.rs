//! Download Manager Core Library
//!
//! Orchestration engine for a desktop download manager: a registry of
//! download jobs, a state machine over their lifecycle, a transfer executor
//! for direct HTTP and external-extractor downloads, and a manager that runs
//! transfers in the background under a global speed cap.
//!
//! # Architecture
//!
//! - [`job`] - job entity, state machine and in-memory registry
//! - [`transfer`] - HTTP transport, external extractor, retry and throttling
//! - [`store`] - durable record storage behind the [`RecordStore`] trait, `SQLite` setup included
//! - [`manager`] - public orchestration API and worker loop
//! - [`settings`] - TOML user settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod job;
pub mod manager;
pub mod settings;
pub mod store;
pub mod transfer;

// Re-export commonly used types
pub use job::{DownloadJob, InvalidTransition, JobEvent, JobId, JobRegistry, JobStatus, format_bytes};
pub use manager::{ActionOutcome, ChangeNotifier, DownloadManager, ManagerConfig, ManagerError};
pub use settings::{Settings, SettingsError, default_database_path, default_settings_path};
pub use store::{RecordStore, SqliteStore, StoreError, StoreOpenError};
pub use transfer::{
    ExternalExtractor, HttpTransport, RetryPolicy, SpeedLimit, TransferError, TransferExecutor,
    TransferOutcome, Transport, TransportError, VideoInfo,
};
