//! HTTP transport over a shared `reqwest` client.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

use super::error::TransportError;
use super::throttle::Throttle;
use super::transport::{ProgressReporter, Transport, TransportRequest};

/// Default connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default total timeout for one attempt in seconds.
pub const TRANSFER_TIMEOUT_SECS: u64 = 3600;

/// Streams HTTP(S) bodies into a sink.
///
/// Create once and share; the inner client pools connections.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` builder error if the client cannot be built.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, TRANSFER_TIMEOUT_SECS)
    }

    /// Creates a transport with explicit connect and total timeouts.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` builder error if the client cannot be built.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        transfer_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(transfer_timeout_secs))
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(url = %request.url))]
    async fn fetch(
        &self,
        request: &TransportRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &mut (dyn ProgressReporter + Send),
    ) -> Result<u64, TransportError> {
        let url = request.url.as_str();
        let response = self
            .client
            .get(url)
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::http_status(url, status.as_u16()));
        }

        let expected = response.content_length().unwrap_or(0);
        debug!(expected, rate_limit = ?request.rate_limit, "response received");
        if progress.report(expected, 0).is_break() {
            return Err(TransportError::Aborted);
        }

        let throttle = request.rate_limit.map(Throttle::new);
        let mut stream = response.bytes_stream();
        let mut transferred: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| TransportError::from_reqwest(url, e))?;

            sink.write_all(&chunk)
                .await
                .map_err(|source| TransportError::Write { source })?;
            transferred += chunk.len() as u64;

            if let Some(throttle) = &throttle {
                throttle.pace(transferred).await;
            }
            if progress.report(expected, transferred).is_break() {
                return Err(TransportError::Aborted);
            }
        }

        sink.flush()
            .await
            .map_err(|source| TransportError::Write { source })?;

        debug!(bytes = transferred, "body received");
        Ok(transferred)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_builds_with_defaults() {
        assert!(HttpTransport::new().is_ok());
        assert!(HttpTransport::with_timeouts(1, 1).is_ok());
    }
}
