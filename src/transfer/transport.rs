//! The transport seam between the executor and the network.

use std::ops::ControlFlow;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tokio::io::AsyncWrite;

use super::error::TransportError;

/// Everything a transport needs for one attempt.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Normalized URL to fetch.
    pub url: String,
    /// Headers to send with the request.
    pub headers: HeaderMap,
    /// Receive-rate cap in bytes per second, `None` for unlimited.
    pub rate_limit: Option<u64>,
}

/// Receives `(expected, transferred)` byte counts while a body streams in.
///
/// `expected` is 0 when the size is unknown. Returning
/// [`ControlFlow::Break`] stops the transfer with [`TransportError::Aborted`].
pub trait ProgressReporter {
    /// Called once before the body and after every received chunk.
    fn report(&mut self, expected: u64, transferred: u64) -> ControlFlow<()>;
}

impl<F> ProgressReporter for F
where
    F: FnMut(u64, u64) -> ControlFlow<()>,
{
    fn report(&mut self, expected: u64, transferred: u64) -> ControlFlow<()> {
        self(expected, transferred)
    }
}

/// Performs one network fetch into a sink.
///
/// Implementations stream the body into `sink`, report progress after every
/// chunk and return the number of bytes written. They must not retry; the
/// executor owns the retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `request.url` into `sink`.
    async fn fetch(
        &self,
        request: &TransportRequest,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &mut (dyn ProgressReporter + Send),
    ) -> Result<u64, TransportError>;
}
