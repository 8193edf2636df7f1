//! External extractor integration (youtube-dl compatible tools).
//!
//! Downloads run as `<exe> -o <output> -f <format> <url>` with stdout and
//! stderr captured into a temporary log that is removed afterwards. Metadata
//! probes run `<exe> --dump-json --no-warnings --no-playlist <url>`.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::TransferError;
use super::executor::TransferOutcome;

/// Creates a temporary log in `dir` plus two handles for the child's stdout
/// and stderr.
fn capture_log(dir: &Path) -> Result<(NamedTempFile, File, File), TransferError> {
    let log = NamedTempFile::new_in(dir).map_err(|source| TransferError::CaptureLog { source })?;
    let stdout = log
        .as_file()
        .try_clone()
        .map_err(|source| TransferError::CaptureLog { source })?;
    let stderr = log
        .as_file()
        .try_clone()
        .map_err(|source| TransferError::CaptureLog { source })?;
    Ok((log, stdout, stderr))
}

/// Format hint used when a job carries none.
pub const DEFAULT_FORMAT: &str = "best";

#[cfg(windows)]
const EXTRACTOR_FILE_NAME: &str = "youtube-dl.exe";
#[cfg(not(windows))]
const EXTRACTOR_FILE_NAME: &str = "youtube-dl";

/// Looks for the extractor next to the running binary.
#[must_use]
pub fn discover_extractor() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join(EXTRACTOR_FILE_NAME);
    candidate.is_file().then_some(candidate)
}

/// Metadata reported by the extractor for a video URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoInfo {
    /// Video title.
    pub title: String,
    /// Description text.
    pub description: Option<String>,
    /// Thumbnail URL.
    pub thumbnail: Option<String>,
    /// Duration in seconds.
    pub duration_secs: Option<f64>,
    /// Uploader / channel name.
    pub uploader: Option<String>,
    /// View count.
    pub view_count: Option<u64>,
    /// Upload date as reported (`YYYYMMDD`).
    pub upload_date: Option<String>,
    /// Available format ids.
    pub formats: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVideoInfo {
    #[serde(default)]
    title: String,
    description: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    view_count: Option<u64>,
    upload_date: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

impl From<RawVideoInfo> for VideoInfo {
    fn from(raw: RawVideoInfo) -> Self {
        Self {
            title: raw.title,
            description: raw.description,
            thumbnail: raw.thumbnail,
            duration_secs: raw.duration,
            uploader: raw.uploader,
            view_count: raw.view_count,
            upload_date: raw.upload_date,
            formats: raw.formats.into_iter().filter_map(|f| f.format_id).collect(),
        }
    }
}

/// Parses the first JSON document of a `--dump-json` output.
///
/// # Errors
///
/// Returns [`TransferError::InvalidMetadata`] when the output is not valid JSON.
pub fn parse_video_info(stdout: &str) -> Result<VideoInfo, TransferError> {
    let first = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    serde_json::from_str::<RawVideoInfo>(first)
        .map(VideoInfo::from)
        .map_err(|source| TransferError::InvalidMetadata { source })
}

/// Runs a youtube-dl compatible executable.
#[derive(Debug, Clone)]
pub struct ExternalExtractor {
    executable: PathBuf,
}

impl ExternalExtractor {
    /// Creates an extractor for `executable`.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Returns the executable path.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn spawn_error(&self, source: std::io::Error) -> TransferError {
        if source.kind() == ErrorKind::NotFound {
            TransferError::ExternalToolMissing {
                path: Some(self.executable.clone()),
            }
        } else {
            TransferError::ExternalToolLaunch {
                path: self.executable.clone(),
                source,
            }
        }
    }

    /// Downloads `url` into `output` with the given format hint.
    ///
    /// The child process is killed if `token` is cancelled. On success the
    /// byte count is the size of `output` on disk.
    #[instrument(skip(self, token), fields(exe = %self.executable.display(), output = %output.display()))]
    pub async fn download(
        &self,
        url: &str,
        output: &Path,
        format: &str,
        token: &CancellationToken,
    ) -> TransferOutcome {
        let (log, stdout, stderr) = match capture_log(&std::env::temp_dir()) {
            Ok(capture) => capture,
            Err(error) => return TransferOutcome::Failed(error),
        };

        let mut child = match Command::new(&self.executable)
            .arg("-o")
            .arg(output)
            .arg("-f")
            .arg(format)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(source) => return TransferOutcome::Failed(self.spawn_error(source)),
        };

        let status = tokio::select! {
            status = child.wait() => status,
            () = token.cancelled() => {
                if let Err(error) = child.kill().await {
                    warn!(%error, "failed to kill extractor process");
                }
                debug!("extractor canceled");
                return TransferOutcome::Canceled;
            }
        };

        match tokio::fs::read(log.path()).await {
            Ok(captured) => debug!(output = %String::from_utf8_lossy(&captured), "extractor log"),
            Err(error) => warn!(%error, "could not read extractor log"),
        }
        drop(log);

        let status = match status {
            Ok(status) => status,
            Err(source) => return TransferOutcome::Failed(self.spawn_error(source)),
        };
        if !status.success() {
            warn!(code = ?status.code(), "extractor exited with failure");
            return TransferOutcome::Failed(TransferError::ExternalToolNonZeroExit {
                code: status.code(),
            });
        }

        let bytes = match tokio::fs::metadata(output).await {
            Ok(meta) => meta.len(),
            Err(error) => {
                warn!(%error, "extractor succeeded but output file is missing");
                0
            }
        };
        info!(bytes, "extractor finished");
        TransferOutcome::Completed { bytes }
    }

    /// Probes `url` for video metadata.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ExternalToolMissing`] or
    /// [`TransferError::ExternalToolLaunch`] if the tool cannot run,
    /// [`TransferError::ExternalToolNonZeroExit`] if it fails, and
    /// [`TransferError::InvalidMetadata`] for unparseable output.
    #[instrument(skip(self), fields(exe = %self.executable.display()))]
    pub async fn video_info(&self, url: &str) -> Result<VideoInfo, TransferError> {
        let output = Command::new(&self.executable)
            .args(["--dump-json", "--no-warnings", "--no-playlist", url])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| self.spawn_error(source))?;

        if !output.status.success() {
            debug!(stderr = %String::from_utf8_lossy(&output.stderr).trim(), "probe failed");
            return Err(TransferError::ExternalToolNonZeroExit {
                code: output.status.code(),
            });
        }

        parse_video_info(&String::from_utf8_lossy(&output.stdout))
    }
}
