//! Transfer execution for a single job.
//!
//! # Overview
//!
//! - [`TransferExecutor`] - picks the strategy for a job and drives it to a
//!   [`TransferOutcome`]
//! - [`Transport`] - seam for one network attempt; [`HttpTransport`] is the
//!   `reqwest` implementation
//! - [`ExternalExtractor`] - youtube-dl compatible tool runner
//! - [`RetryPolicy`] - fixed-delay retry for transient transport failures
//! - [`SpeedLimit`] / [`Throttle`] - global receive-rate cap
//! - [`ProgressSampler`] - speed sampling at one-second intervals

mod error;
mod executor;
mod external;
mod headers;
mod http;
mod progress;
mod retry;
mod throttle;
mod transport;
mod url;

pub use error::{TransferError, TransportError};
pub use executor::{TransferExecutor, TransferOutcome};
pub use external::{
    DEFAULT_FORMAT, ExternalExtractor, VideoInfo, discover_extractor, parse_video_info,
};
pub use headers::{BROWSER_USER_AGENT, HeaderOverrides, request_headers};
pub use http::{CONNECT_TIMEOUT_SECS, HttpTransport, TRANSFER_TIMEOUT_SECS};
pub use progress::{ProgressSampler, SAMPLE_INTERVAL};
pub use retry::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, FailureType, RetryDecision, RetryPolicy,
    classify_error,
};
pub use throttle::{SpeedLimit, Throttle};
pub use transport::{ProgressReporter, Transport, TransportRequest};
pub use url::normalize_url;
