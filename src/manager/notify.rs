//! Payload-free change notifications.

use tokio::sync::watch;

/// Broadcasts "state changed" as a revision counter.
///
/// Subscribers watch the counter and re-read whatever they display; the
/// value itself carries no payload.
#[derive(Debug)]
pub struct ChangeNotifier {
    tx: watch::Sender<u64>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    /// Creates a notifier at revision 0.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Bumps the revision and wakes all subscribers.
    pub fn notify(&self) {
        self.tx.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    /// Returns a receiver that observes every future revision.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Current revision.
    #[must_use]
    pub fn revision(&self) -> u64 {
        *self.tx.borrow()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_without_subscribers_still_counts() {
        let notifier = ChangeNotifier::new();
        notifier.notify();
        notifier.notify();
        assert_eq!(notifier.revision(), 2);
    }

    #[tokio::test]
    async fn test_subscriber_wakes_on_notify() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();

        notifier.notify();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
    }
}
