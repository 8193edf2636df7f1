//! Download job entity and status definitions.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned to a job by the registry.
pub type JobId = i64;

const KB: f64 = 1024.0;
const MB: f64 = KB * 1024.0;
const GB: f64 = MB * 1024.0;

/// Highest progress value reported while a transfer is still running.
///
/// 100 is reserved for jobs the executor has marked completed.
const IN_FLIGHT_PROGRESS_CAP: u8 = 99;

/// Status of a download job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be started.
    Pending,
    /// Started; picked up (or about to be) by the worker loop.
    Downloading,
    /// Stopped by the user; can be resumed.
    Paused,
    /// Transfer finished successfully.
    Completed,
    /// Transfer failed after all attempts; can be resumed.
    Failed,
    /// Canceled record carried over from storage.
    Canceled,
}

impl JobStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    /// Returns a short human-readable label for list displays.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Waiting",
            Self::Downloading => "Downloading",
            Self::Paused => "Paused",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "canceled" => Ok(Self::Canceled),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}

/// A single download tracked by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadJob {
    /// Unique identifier (0 until the registry assigns one).
    pub id: JobId,
    /// Sanitized file name written inside `save_path`.
    pub name: String,
    /// Source URL as entered by the user.
    pub url: String,
    /// Target directory.
    pub save_path: PathBuf,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Percent complete, 0..=100.
    pub progress: u8,
    /// Expected size in bytes, 0 while unknown.
    pub total_bytes: u64,
    /// Bytes received so far.
    pub downloaded_bytes: u64,
    /// Last sampled transfer rate.
    pub speed_bytes_per_sec: u64,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// Routed to the external extractor instead of direct HTTP.
    pub is_external_extraction: bool,
    /// Format hint for the external extractor.
    pub extraction_format: Option<String>,
}

impl DownloadJob {
    /// Creates a pending direct-transfer job without an id.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            url: url.into(),
            save_path: save_path.into(),
            status: JobStatus::Pending,
            progress: 0,
            total_bytes: 0,
            downloaded_bytes: 0,
            speed_bytes_per_sec: 0,
            created_at: Utc::now(),
            is_external_extraction: false,
            extraction_format: None,
        }
    }

    /// Creates a pending job routed to the external extractor.
    #[must_use]
    pub fn new_external(
        name: impl Into<String>,
        url: impl Into<String>,
        save_path: impl Into<PathBuf>,
        format: impl Into<String>,
    ) -> Self {
        Self {
            is_external_extraction: true,
            extraction_format: Some(format.into()),
            ..Self::new(name, url, save_path)
        }
    }

    /// Full path of the output file.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.save_path.join(&self.name)
    }

    /// Records a progress report from the transport.
    ///
    /// When `expected` is 0 the total is unknown and `progress` keeps its last
    /// value; a remembered total that the byte count has outgrown is dropped.
    /// Progress never reaches 100 here; only [`Self::mark_completed`] sets it.
    pub fn record_progress(&mut self, expected: u64, transferred: u64) {
        self.downloaded_bytes = transferred;
        if expected == 0 {
            if transferred > self.total_bytes {
                self.total_bytes = 0;
            }
            return;
        }
        self.total_bytes = expected.max(transferred);
        self.progress = percent(self.downloaded_bytes, self.total_bytes).min(IN_FLIGHT_PROGRESS_CAP);
    }

    /// Clears all transfer counters.
    pub fn reset_progress(&mut self) {
        self.progress = 0;
        self.downloaded_bytes = 0;
        self.speed_bytes_per_sec = 0;
    }

    /// Sets the final counters of a successful transfer.
    pub fn mark_completed(&mut self, bytes: u64) {
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.total_bytes = bytes;
        self.downloaded_bytes = bytes;
        self.speed_bytes_per_sec = 0;
    }

    /// Human-readable total size (e.g. `1.50 MB`).
    #[must_use]
    pub fn formatted_size(&self) -> String {
        format_bytes(self.total_bytes)
    }

    /// Human-readable speed (e.g. `512.00 KB/s`).
    #[must_use]
    pub fn formatted_speed(&self) -> String {
        format!("{}/s", format_bytes(self.speed_bytes_per_sec))
    }
}

impl fmt::Display for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DownloadJob {{ id: {}, name: {}, status: {} }}",
            self.id, self.name, self.status
        )
    }
}

#[allow(clippy::cast_possible_truncation)]
fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = u128::from(done) * 100 / u128::from(total);
    pct.min(100) as u8
}

/// Formats a byte count with a 1024 base.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    let value = bytes as f64;
    if value < KB {
        format!("{bytes} B")
    } else if value < MB {
        format!("{:.2} KB", value / KB)
    } else if value < GB {
        format!("{:.2} MB", value / MB)
    } else {
        format!("{:.2} GB", value / GB)
    }
}
