//! Job state machine.
//!
//! Every status change goes through [`DownloadJob::apply`], which rejects
//! edges that are not part of the lifecycle:
//!
//! ```text
//! Pending | Canceled --Start--> Downloading
//! Downloading --Pause--> Paused
//! Paused | Failed --Resume--> Downloading
//! Downloading | Paused --Cancel--> Pending      (counters reset)
//! Downloading --Complete--> Completed
//! Downloading --Fail--> Failed
//! ```

use thiserror::Error;

use super::model::{DownloadJob, JobStatus};

/// An event that may move a job to another status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// User started the job.
    Start,
    /// User paused a running job.
    Pause,
    /// User resumed a paused or failed job.
    Resume,
    /// User canceled the job.
    Cancel,
    /// Executor finished successfully with this many bytes.
    Complete {
        /// Final byte count.
        bytes: u64,
    },
    /// Executor gave up.
    Fail,
}

impl JobEvent {
    /// Short name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Cancel => "cancel",
            Self::Complete { .. } => "complete",
            Self::Fail => "fail",
        }
    }
}

/// A transition that the current status does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {} a job that is {from}", event.as_str())]
pub struct InvalidTransition {
    /// Status the job was in.
    pub from: JobStatus,
    /// Rejected event.
    pub event: JobEvent,
}

impl JobStatus {
    /// Returns the status reached by `event`, or `None` if the edge does not exist.
    #[must_use]
    pub fn next(self, event: JobEvent) -> Option<JobStatus> {
        use JobStatus::{Canceled, Completed, Downloading, Failed, Paused, Pending};

        match (self, event) {
            (Pending | Canceled, JobEvent::Start) => Some(Downloading),
            (Downloading, JobEvent::Pause) => Some(Paused),
            (Paused | Failed, JobEvent::Resume) => Some(Downloading),
            (Downloading | Paused, JobEvent::Cancel) => Some(Pending),
            (Downloading, JobEvent::Complete { .. }) => Some(Completed),
            (Downloading, JobEvent::Fail) => Some(Failed),
            _ => None,
        }
    }
}

impl DownloadJob {
    /// Applies `event`, updating status and the counters tied to it.
    ///
    /// Returns the previous status.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the job untouched when the
    /// edge is not allowed from the current status.
    pub fn apply(&mut self, event: JobEvent) -> Result<JobStatus, InvalidTransition> {
        let from = self.status;
        let Some(to) = from.next(event) else {
            return Err(InvalidTransition { from, event });
        };

        match event {
            JobEvent::Cancel => self.reset_progress(),
            JobEvent::Complete { bytes } => self.mark_completed(bytes),
            JobEvent::Start | JobEvent::Resume | JobEvent::Pause | JobEvent::Fail => {
                self.speed_bytes_per_sec = 0;
            }
        }
        self.status = to;
        Ok(from)
    }
}
