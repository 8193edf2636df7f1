//! Runs one job's transfer to a terminal outcome.

use std::sync::Arc;

use tokio::fs::File;
use tokio::io::BufWriter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::{TransferError, TransportError};
use super::external::{DEFAULT_FORMAT, ExternalExtractor};
use super::headers::{HeaderOverrides, request_headers};
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::throttle::SpeedLimit;
use super::transport::{ProgressReporter, Transport, TransportRequest};
use super::url::normalize_url;
use crate::job::DownloadJob;

/// Terminal result of a transfer.
#[derive(Debug)]
pub enum TransferOutcome {
    /// All bytes were written.
    Completed {
        /// Final size in bytes.
        bytes: u64,
    },
    /// The transfer gave up.
    Failed(TransferError),
    /// The job's token was cancelled; nothing should be written back.
    Canceled,
}

/// Executes direct and external transfers.
pub struct TransferExecutor {
    transport: Arc<dyn Transport>,
    extractor: Option<ExternalExtractor>,
    retry: RetryPolicy,
    headers: HeaderOverrides,
    speed_limit: Arc<SpeedLimit>,
}

impl std::fmt::Debug for TransferExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferExecutor")
            .field("extractor", &self.extractor)
            .field("retry", &self.retry)
            .field("headers", &self.headers)
            .field("speed_limit", &self.speed_limit)
            .finish_non_exhaustive()
    }
}

impl TransferExecutor {
    /// Creates an executor with the default retry policy and no extractor.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, speed_limit: Arc<SpeedLimit>) -> Self {
        Self {
            transport,
            extractor: None,
            retry: RetryPolicy::default(),
            headers: HeaderOverrides::default(),
            speed_limit,
        }
    }

    /// Sets the external extractor used for flagged jobs.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Option<ExternalExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets per-domain header overrides.
    #[must_use]
    pub fn with_header_overrides(mut self, headers: HeaderOverrides) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the configured extractor, if any.
    #[must_use]
    pub fn extractor(&self) -> Option<&ExternalExtractor> {
        self.extractor.as_ref()
    }

    /// Returns the shared speed limit read at each attempt.
    #[must_use]
    pub fn speed_limit(&self) -> &Arc<SpeedLimit> {
        &self.speed_limit
    }

    /// Runs `job` to completion, failure or cancellation.
    #[instrument(skip_all, fields(job_id = job.id, external = job.is_external_extraction))]
    pub async fn execute(
        &self,
        job: &DownloadJob,
        token: &CancellationToken,
        progress: &mut (dyn ProgressReporter + Send),
    ) -> TransferOutcome {
        if let Err(source) = tokio::fs::create_dir_all(&job.save_path).await {
            warn!(path = %job.save_path.display(), %source, "cannot create target directory");
            return TransferOutcome::Failed(TransferError::directory(&job.save_path, source));
        }

        if job.is_external_extraction {
            self.execute_external(job, token).await
        } else {
            self.execute_direct(job, token, progress).await
        }
    }

    async fn execute_external(&self, job: &DownloadJob, token: &CancellationToken) -> TransferOutcome {
        let Some(extractor) = &self.extractor else {
            warn!("no external extractor configured");
            return TransferOutcome::Failed(TransferError::ExternalToolMissing { path: None });
        };
        let format = job
            .extraction_format
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(DEFAULT_FORMAT);

        extractor
            .download(&job.url, &job.output_path(), format, token)
            .await
    }

    async fn execute_direct(
        &self,
        job: &DownloadJob,
        token: &CancellationToken,
        progress: &mut (dyn ProgressReporter + Send),
    ) -> TransferOutcome {
        let path = job.output_path();
        let url = normalize_url(&job.url);
        let mut attempt: u32 = 1;

        loop {
            if token.is_cancelled() {
                return TransferOutcome::Canceled;
            }

            let file = match File::create(&path).await {
                Ok(file) => file,
                Err(source) => {
                    warn!(path = %path.display(), %source, "cannot open destination file");
                    return TransferOutcome::Failed(TransferError::file_open(&path, source));
                }
            };
            let mut writer = BufWriter::new(file);
            let request = TransportRequest {
                url: url.clone(),
                headers: request_headers(&url, &self.headers),
                rate_limit: self.speed_limit.bytes_per_sec(),
            };
            debug!(attempt, url = %request.url, rate_limit = ?request.rate_limit, "starting attempt");

            let result = tokio::select! {
                biased;
                () = token.cancelled() => return TransferOutcome::Canceled,
                result = self.transport.fetch(&request, &mut writer, progress) => result,
            };

            let error = match result {
                Ok(bytes) => {
                    info!(bytes, attempt, "transfer complete");
                    return TransferOutcome::Completed { bytes };
                }
                Err(_) if token.is_cancelled() => return TransferOutcome::Canceled,
                Err(TransportError::Aborted) => return TransferOutcome::Canceled,
                Err(error) => TransferError::Transport(error),
            };

            match self.retry.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry { delay, attempt: next } => {
                    warn!(attempt, next_attempt = next, delay_ms = delay.as_millis(), %error, "attempt failed, retrying");
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return TransferOutcome::Canceled,
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt = next;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(attempt, %reason, %error, "transfer failed");
                    return TransferOutcome::Failed(error);
                }
            }
        }
    }
}
