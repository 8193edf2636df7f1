//! Durable storage for download records.
//!
//! The manager depends only on the [`RecordStore`] seam; [`SqliteStore`] is
//! the production implementation over the `downloads` table.
//!
//! # Example
//!
//! ```no_run
//! use download_manager::{RecordStore, SqliteStore};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open(Path::new("downloads.db")).await?;
//! for job in store.list_all().await? {
//!     println!("{} {}", job.id, job.name);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod sqlite;

pub use error::{StoreDbErrorKind, StoreError, StoreOpenError};
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::job::{DownloadJob, JobId};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Data-access contract for download records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a new record. The job must already carry its id.
    async fn create(&self, job: &DownloadJob) -> Result<()>;

    /// Overwrites the mutable fields of an existing record.
    ///
    /// Returns [`StoreError::NotFound`] when no record has the job's id.
    async fn update(&self, job: &DownloadJob) -> Result<()>;

    /// Deletes a record. Returns [`StoreError::NotFound`] when absent.
    async fn delete(&self, id: JobId) -> Result<()>;

    /// Returns every record ordered by id.
    async fn list_all(&self) -> Result<Vec<DownloadJob>>;

    /// Returns the record with `id`, if any.
    async fn get_by_id(&self, id: JobId) -> Result<Option<DownloadJob>>;
}
