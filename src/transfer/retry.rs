//! Retry policy for direct transfers.
//!
//! Failures are classified into a [`FailureType`]; only transient transport
//! failures are retried, after a fixed delay, up to a bounded number of
//! attempts.
//!
//! # Example
//!
//! ```
//! use download_manager::transfer::{RetryDecision, RetryPolicy, FailureType};
//!
//! let policy = RetryPolicy::default();
//! match policy.should_retry(FailureType::Transient, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use tracing::debug;

use super::error::{TransferError, TransportError};

/// Default maximum attempts, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Classification of a transfer failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// The network attempt failed; another attempt may succeed.
    Transient,
    /// Local or tool failure; retrying would not help.
    Permanent,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Number of the next attempt (1-indexed).
        attempt: u32,
    },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Fixed-delay retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Returns the maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed.
    #[must_use]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }
}

/// Classifies a transfer error for retry decisions.
///
/// Only network-side transport failures are transient. Local write failures,
/// directory/file errors and every external-tool error are permanent.
#[must_use]
pub fn classify_error(error: &TransferError) -> FailureType {
    match error {
        TransferError::Transport(
            TransportError::Timeout { .. }
            | TransportError::Network { .. }
            | TransportError::HttpStatus { .. },
        ) => FailureType::Transient,
        TransferError::Transport(TransportError::Write { .. } | TransportError::Aborted)
        | TransferError::DirectoryCreateFailed { .. }
        | TransferError::FileOpenFailed { .. }
        | TransferError::ExternalToolMissing { .. }
        | TransferError::ExternalToolLaunch { .. }
        | TransferError::CaptureLog { .. }
        | TransferError::ExternalToolNonZeroExit { .. }
        | TransferError::InvalidMetadata { .. } => FailureType::Permanent,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn test_should_retry_transient_until_exhausted() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(2),
                attempt: 2
            }
        );
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        match policy.should_retry(FailureType::Transient, 3) {
            RetryDecision::DoNotRetry { reason } => assert!(reason.contains("exhausted")),
            RetryDecision::Retry { .. } => panic!("third failure must not retry"),
        }
    }

    #[test]
    fn test_should_retry_permanent_never() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.should_retry(FailureType::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_classify_transport_errors_transient() {
        let timeout = TransferError::from(TransportError::Timeout {
            url: "u".to_string(),
        });
        let status = TransferError::from(TransportError::http_status("u", 503));
        assert_eq!(classify_error(&timeout), FailureType::Transient);
        assert_eq!(classify_error(&status), FailureType::Transient);
    }

    #[test]
    fn test_classify_local_errors_permanent() {
        let io = || std::io::Error::other("x");
        assert_eq!(
            classify_error(&TransferError::directory("/d", io())),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&TransferError::file_open("/d/f", io())),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&TransferError::from(TransportError::Write { source: io() })),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&TransferError::ExternalToolNonZeroExit { code: Some(1) }),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&TransferError::CaptureLog { source: io() }),
            FailureType::Permanent
        );
    }
}
