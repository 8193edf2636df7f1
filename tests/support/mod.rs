//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod socket_guard;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use download_manager::{
    DownloadManager, HttpTransport, ManagerConfig, RecordStore, RetryPolicy, SpeedLimit,
    SqliteStore, TransferExecutor,
};
use wiremock::{Respond, ResponseTemplate};

/// Manager config with short scan intervals so tests finish quickly.
pub fn fast_config() -> ManagerConfig {
    ManagerConfig {
        idle_interval: Duration::from_millis(10),
        dispatch_interval: Duration::from_millis(1),
        ..ManagerConfig::default()
    }
}

/// Executor over a real HTTP transport with a short retry delay.
pub fn http_executor() -> TransferExecutor {
    let transport = HttpTransport::with_timeouts(5, 30).expect("build HTTP client");
    TransferExecutor::new(Arc::new(transport), Arc::new(SpeedLimit::new()))
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(20)))
}

/// In-memory SQLite store.
pub async fn memory_store() -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::open_in_memory()
            .await
            .expect("in-memory database"),
    )
}

/// Manager over `store` with an HTTP executor and fast intervals.
pub async fn http_manager(store: Arc<dyn RecordStore>) -> DownloadManager {
    DownloadManager::new(store, http_executor(), fast_config())
        .await
        .expect("manager loads records")
}

/// Waits up to five seconds for the manager to go idle.
pub async fn wait_idle(manager: &DownloadManager) {
    tokio::time::timeout(Duration::from_secs(5), manager.wait_until_idle())
        .await
        .expect("manager went idle");
}

/// Responder that fails the first `fail_count` requests with `status`, then
/// returns 200 with `body`.
pub struct FlakyResponder {
    pub request_count: Arc<AtomicUsize>,
    pub fail_count: usize,
    pub status: u16,
    pub body: Vec<u8>,
}

impl FlakyResponder {
    pub fn new(fail_count: usize, status: u16, body: &[u8]) -> Self {
        Self {
            request_count: Arc::new(AtomicUsize::new(0)),
            fail_count,
            status,
            body: body.to_vec(),
        }
    }
}

impl Respond for FlakyResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.request_count.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_count {
            ResponseTemplate::new(self.status)
        } else {
            ResponseTemplate::new(200).set_body_bytes(self.body.clone())
        }
    }
}
