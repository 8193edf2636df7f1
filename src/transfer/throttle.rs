//! Global speed limit and receive-rate pacing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Sentinel stored while no limit has ever been set.
const UNSET: u64 = u64::MAX;

/// Shared speed cap in KB/s.
///
/// `0` means unlimited and is distinct from "never set". Transfers read the
/// value when an attempt starts; changes do not affect running attempts.
#[derive(Debug)]
pub struct SpeedLimit {
    kbps: AtomicU64,
}

impl Default for SpeedLimit {
    fn default() -> Self {
        Self {
            kbps: AtomicU64::new(UNSET),
        }
    }
}

impl SpeedLimit {
    /// Creates a limit that has never been set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cap in KB/s; `0` means unlimited.
    pub fn set(&self, kbps: u64) {
        self.kbps.store(kbps.min(UNSET - 1), Ordering::Relaxed);
    }

    /// Returns the cap in KB/s, or `None` if never set.
    #[must_use]
    pub fn get(&self) -> Option<u64> {
        match self.kbps.load(Ordering::Relaxed) {
            UNSET => None,
            kbps => Some(kbps),
        }
    }

    /// Returns the cap in bytes per second, or `None` when unlimited.
    #[must_use]
    pub fn bytes_per_sec(&self) -> Option<u64> {
        self.get()
            .filter(|kbps| *kbps > 0)
            .map(|kbps| kbps.saturating_mul(1024))
    }
}

/// Delays a stream so that its average rate stays at or below a cap.
#[derive(Debug)]
pub struct Throttle {
    bytes_per_sec: u64,
    started: Instant,
}

impl Throttle {
    /// Starts pacing at `bytes_per_sec` (must be non-zero).
    #[must_use]
    pub fn new(bytes_per_sec: u64) -> Self {
        Self {
            bytes_per_sec: bytes_per_sec.max(1),
            started: Instant::now(),
        }
    }

    /// How long to wait after `transferred` bytes so the average rate holds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn delay_for(&self, transferred: u64, now: Instant) -> Duration {
        let target = Duration::from_secs_f64(transferred as f64 / self.bytes_per_sec as f64);
        target.saturating_sub(now.saturating_duration_since(self.started))
    }

    /// Sleeps as needed after `transferred` bytes.
    pub async fn pace(&self, transferred: u64) {
        let delay = self.delay_for(transferred, Instant::now());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_limit_never_set_is_distinct_from_unlimited() {
        let limit = SpeedLimit::new();
        assert_eq!(limit.get(), None);

        limit.set(0);
        assert_eq!(limit.get(), Some(0));
        assert_eq!(limit.bytes_per_sec(), None);
    }

    #[test]
    fn test_speed_limit_round_trip() {
        let limit = SpeedLimit::new();
        limit.set(100);
        assert_eq!(limit.get(), Some(100));
        assert_eq!(limit.bytes_per_sec(), Some(102_400));
    }

    #[test]
    fn test_speed_limit_max_value_stays_set() {
        let limit = SpeedLimit::new();
        limit.set(u64::MAX);
        assert!(limit.get().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_delay_matches_rate() {
        let throttle = Throttle::new(1000);
        let now = Instant::now();
        assert_eq!(throttle.delay_for(500, now), Duration::from_millis(500));
        assert_eq!(
            throttle.delay_for(500, now + Duration::from_secs(1)),
            Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_pace_advances_time() {
        let throttle = Throttle::new(1024);
        let start = Instant::now();
        throttle.pace(2048).await;
        assert!(Instant::now() - start >= Duration::from_secs(2));
    }
}
