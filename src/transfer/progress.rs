//! Transfer speed sampling.

use std::time::Duration;

use tokio::time::Instant;

/// Minimum time between two speed samples.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Computes transfer speed at most once per [`SAMPLE_INTERVAL`].
#[derive(Debug, Clone)]
pub struct ProgressSampler {
    last_at: Instant,
    last_bytes: u64,
}

impl ProgressSampler {
    /// Starts sampling at `now` with zero bytes.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            last_at: now,
            last_bytes: 0,
        }
    }

    /// Returns the speed in bytes/s when at least one interval has elapsed
    /// since the previous sample, otherwise `None`.
    ///
    /// A byte count lower than the last sample (a restarted attempt) resets
    /// the baseline.
    pub fn sample(&mut self, now: Instant, transferred: u64) -> Option<u64> {
        if transferred < self.last_bytes {
            self.last_bytes = 0;
        }
        let elapsed = now.saturating_duration_since(self.last_at);
        if elapsed < SAMPLE_INTERVAL {
            return None;
        }
        let delta = transferred - self.last_bytes;
        let speed = u64::try_from(u128::from(delta) * 1000 / elapsed.as_millis().max(1))
            .unwrap_or(u64::MAX);
        self.last_at = now;
        self.last_bytes = transferred;
        Some(speed)
    }
}
