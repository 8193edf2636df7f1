//! Error types for the transfer module.
//!
//! [`TransportError`] covers one network attempt; [`TransferError`] is the
//! terminal reason a job ended up `Failed`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a [`Transport`](super::Transport) during one attempt.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connect or total timeout elapsed.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS, reset).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Writing received bytes to the destination failed.
    #[error("failed writing downloaded data: {source}")]
    Write {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The progress reporter asked the transfer to stop.
    #[error("transfer aborted")]
    Aborted,
}

impl TransportError {
    /// Creates a timeout or network error from a reqwest error.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Returns the HTTP status code, or 0 for errors without one.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::HttpStatus { status, .. } => *status,
            Self::Timeout { .. } | Self::Network { .. } | Self::Write { .. } | Self::Aborted => 0,
        }
    }
}

/// Reasons a job's transfer ends in `Failed`.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The target directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreateFailed {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The destination file could not be opened for writing.
    #[error("failed to open {path} for writing: {source}")]
    FileOpenFailed {
        /// File that could not be opened.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The transport attempt failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No extractor executable is configured, or it does not exist.
    #[error("external extractor not available{}", .path.as_ref().map(|p| format!(": {}", p.display())).unwrap_or_default())]
    ExternalToolMissing {
        /// The configured path, when one was set.
        path: Option<PathBuf>,
    },

    /// The extractor exists but could not be started.
    #[error("failed to launch external extractor {path}: {source}")]
    ExternalToolLaunch {
        /// Executable path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The temporary log capturing the extractor's output could not be set up.
    #[error("failed to create extractor log: {source}")]
    CaptureLog {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The extractor exited with a non-zero status.
    #[error("external extractor exited with {}", .code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    ExternalToolNonZeroExit {
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
    },

    /// The extractor's metadata output could not be parsed.
    #[error("invalid metadata from external extractor: {source}")]
    InvalidMetadata {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

impl TransferError {
    /// Creates a `DirectoryCreateFailed` error.
    pub fn directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DirectoryCreateFailed {
            path: path.into(),
            source,
        }
    }

    /// Creates a `FileOpenFailed` error.
    pub fn file_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileOpenFailed {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_http_status_code() {
        let err = TransportError::http_status("https://example.com/a", 503);
        assert_eq!(err.code(), 503);
        assert_eq!(err.to_string(), "HTTP 503 downloading https://example.com/a");
        assert_eq!(TransportError::Aborted.code(), 0);
    }

    #[test]
    fn test_transfer_error_from_transport() {
        let err: TransferError = TransportError::Timeout {
            url: "https://example.com/a".to_string(),
        }
        .into();
        assert!(matches!(err, TransferError::Transport(TransportError::Timeout { .. })));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_transfer_error_tool_missing_message() {
        let none = TransferError::ExternalToolMissing { path: None };
        assert_eq!(none.to_string(), "external extractor not available");

        let some = TransferError::ExternalToolMissing {
            path: Some(PathBuf::from("/opt/yt")),
        };
        assert!(some.to_string().ends_with(": /opt/yt"));
    }

    #[test]
    fn test_transfer_error_nonzero_exit_message() {
        let code = TransferError::ExternalToolNonZeroExit { code: Some(2) };
        assert_eq!(code.to_string(), "external extractor exited with code 2");
        let signal = TransferError::ExternalToolNonZeroExit { code: None };
        assert!(signal.to_string().contains("signal"));
    }

    #[test]
    fn test_transfer_error_directory_helper() {
        let err = TransferError::directory(
            "/no/such",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/no/such"));
    }
}
