//! Download orchestration.
//!
//! [`DownloadManager`] is the public API: it owns the [`JobRegistry`], a
//! [`RecordStore`], the [`TransferExecutor`] and the background worker loop.
//! Every mutation updates the registry under its lock, then the store, then
//! bumps the change notifier.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use download_manager::{DownloadManager, Settings, SqliteStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::default();
//! let store = Arc::new(SqliteStore::open_in_memory().await?);
//! let manager = DownloadManager::from_settings(&settings, store).await?;
//!
//! let id = manager.add_download("https://example.com/file.zip", &settings.default_save_path).await;
//! manager.start(id).await;
//! manager.wait_until_idle().await;
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod naming;
mod notify;
mod worker;

pub use naming::{EXTERNAL_EXTENSION, name_from_title, name_from_url, sanitize_file_name};
pub use notify::ChangeNotifier;

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::job::{DownloadJob, JobEvent, JobId, JobRegistry, JobStatus};
use crate::settings::Settings;
use crate::store::{RecordStore, StoreError};
use crate::transfer::{
    DEFAULT_FORMAT, ExternalExtractor, HeaderOverrides, HttpTransport, SpeedLimit,
    TransferError, TransferExecutor, VideoInfo,
};

/// Default wait between scans when nothing was dispatched.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(500);

/// Default wait after a dispatch before the next scan.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on how long shutdown waits for cancelled transfers to exit.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a user-initiated operation on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The operation took effect.
    Applied,
    /// No job has the id.
    NotFound,
    /// The job's status does not allow the operation.
    InvalidPrecondition {
        /// Status the job was in.
        status: JobStatus,
    },
}

impl ActionOutcome {
    /// Returns `true` for [`ActionOutcome::Applied`].
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Errors raised while building a manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Persisted records could not be loaded.
    #[error("failed to load download records: {0}")]
    Load(#[from] StoreError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Cap on concurrently running transfers.
    pub max_simultaneous_downloads: usize,
    /// Format hint used when an external job is added without one.
    pub default_format: String,
    /// Wait between scans when nothing was dispatched.
    pub idle_interval: Duration,
    /// Wait after a dispatch.
    pub dispatch_interval: Duration,
    /// Spawn the worker loop when a job is started or resumed. When off, only
    /// an explicit [`DownloadManager::ensure_worker`] runs transfers.
    pub auto_start_worker: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_simultaneous_downloads: crate::settings::DEFAULT_MAX_SIMULTANEOUS_DOWNLOADS,
            default_format: DEFAULT_FORMAT.to_string(),
            idle_interval: DEFAULT_IDLE_INTERVAL,
            dispatch_interval: DEFAULT_DISPATCH_INTERVAL,
            auto_start_worker: true,
        }
    }
}

impl From<&Settings> for ManagerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            max_simultaneous_downloads: settings.max_simultaneous_downloads,
            default_format: settings.extractor_default_format.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct ActiveTransfer {
    token: CancellationToken,
    serial: u64,
}

/// State shared between the API, the worker loop and transfer tasks.
struct Shared {
    registry: JobRegistry,
    store: Arc<dyn RecordStore>,
    executor: TransferExecutor,
    notifier: ChangeNotifier,
    active: DashMap<JobId, ActiveTransfer>,
    next_serial: AtomicU64,
    config: ManagerConfig,
}

impl Shared {
    /// Writes `job` to the store; failures are logged and the in-memory state kept.
    async fn persist(&self, job: &DownloadJob) {
        if let Err(error) = self.store.update(job).await {
            warn!(job_id = job.id, status = %job.status, %error, "failed to persist job state");
        }
    }

    fn cancel_active(&self, id: JobId) {
        if let Some(active) = self.active.get(&id) {
            debug!(job_id = id, serial = active.serial, "cancelling transfer");
            active.token.cancel();
        }
    }
}

struct WorkerHandle {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Public API over the job registry, store and worker loop.
pub struct DownloadManager {
    shared: Arc<Shared>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("jobs", &self.shared.registry.len())
            .field("active", &self.shared.active.len())
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl DownloadManager {
    /// Builds a manager and loads persisted jobs from `store`.
    ///
    /// Records left in `Downloading` by an earlier process are moved to
    /// `Paused` and written back. The id counter continues after the highest
    /// loaded id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the records cannot be listed.
    #[instrument(skip_all)]
    pub async fn new(
        store: Arc<dyn RecordStore>,
        executor: TransferExecutor,
        mut config: ManagerConfig,
    ) -> Result<Self, StoreError> {
        config.max_simultaneous_downloads = config.max_simultaneous_downloads.max(1);
        let registry = JobRegistry::new();

        for mut job in store.list_all().await? {
            if job.status == JobStatus::Downloading && job.apply(JobEvent::Pause).is_ok() {
                info!(job_id = job.id, name = %job.name, "interrupted download marked paused");
                if let Err(error) = store.update(&job).await {
                    warn!(job_id = job.id, %error, "failed to persist recovered job");
                }
            }
            registry.insert_existing(job);
        }
        info!(jobs = registry.len(), "download records loaded");

        Ok(Self {
            shared: Arc::new(Shared {
                registry,
                store,
                executor,
                notifier: ChangeNotifier::new(),
                active: DashMap::new(),
                next_serial: AtomicU64::new(1),
                config,
            }),
            worker: Mutex::new(None),
        })
    }

    /// Builds a manager with an HTTP transport and extractor from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if the HTTP client cannot be built or the
    /// records cannot be loaded.
    pub async fn from_settings(
        settings: &Settings,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, ManagerError> {
        Self::from_settings_with_config(settings, ManagerConfig::from(settings), store).await
    }

    /// Like [`Self::from_settings`] with explicit orchestrator tuning.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError`] if the HTTP client cannot be built or the
    /// records cannot be loaded.
    pub async fn from_settings_with_config(
        settings: &Settings,
        config: ManagerConfig,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self, ManagerError> {
        let transport = HttpTransport::with_timeouts(
            settings.connect_timeout_secs,
            settings.transfer_timeout_secs,
        )?;
        let speed_limit = Arc::new(SpeedLimit::new());
        if let Some(kbps) = settings.speed_limit_kbps {
            speed_limit.set(kbps);
        }
        let executor = TransferExecutor::new(Arc::new(transport), speed_limit)
            .with_extractor(settings.extractor_path().map(ExternalExtractor::new))
            .with_header_overrides(HeaderOverrides::new(settings.headers.clone()));

        Ok(Self::new(store, executor, config).await?)
    }

    fn worker(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the worker loop unless it is already running.
    pub fn ensure_worker(&self) {
        let mut worker = self.worker();
        if worker
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return;
        }
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(worker::run(Arc::clone(&self.shared), shutdown.clone()));
        *worker = Some(WorkerHandle { shutdown, handle });
        debug!("worker loop spawned");
    }

    /// Returns `true` while the worker loop is running.
    #[must_use]
    pub fn is_worker_running(&self) -> bool {
        self.worker()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    async fn register(&self, job: DownloadJob) -> JobId {
        let id = self.shared.registry.add(job);
        if let Some(job) = self.shared.registry.get(id) {
            if let Err(error) = self.shared.store.create(&job).await {
                warn!(job_id = id, %error, "failed to persist new job");
            }
            info!(job_id = id, name = %job.name, url = %job.url, "download added");
        }
        self.shared.notifier.notify();
        id
    }

    /// Adds a direct download named after the URL's last path segment.
    #[instrument(skip(self, save_path), fields(url = %url))]
    pub async fn add_download(&self, url: &str, save_path: impl Into<PathBuf>) -> JobId {
        let job = DownloadJob::new(name_from_url(url), url, save_path);
        self.register(job).await
    }

    /// Adds a job for the external extractor, named `<title>.mp4`.
    ///
    /// An empty `format_hint` uses the configured default format.
    #[instrument(skip(self, save_path), fields(url = %url))]
    pub async fn add_external_download(
        &self,
        url: &str,
        save_path: impl Into<PathBuf>,
        title: &str,
        format_hint: &str,
    ) -> JobId {
        let format = if format_hint.trim().is_empty() {
            self.shared.config.default_format.as_str()
        } else {
            format_hint.trim()
        };
        let job = DownloadJob::new_external(name_from_title(title), url, save_path, format);
        self.register(job).await
    }

    /// Applies `event` under the registry lock, cancelling the running
    /// transfer first for pause and cancel.
    async fn transition(&self, id: JobId, event: JobEvent) -> ActionOutcome {
        let shared = &self.shared;
        let result = shared.registry.update(id, |job| {
            if job.status.next(event).is_some() && matches!(event, JobEvent::Pause | JobEvent::Cancel) {
                shared.cancel_active(id);
            }
            job.apply(event).map(|_| job.clone())
        });

        match result {
            None => {
                debug!(job_id = id, event = event.as_str(), "job not found");
                ActionOutcome::NotFound
            }
            Some(Err(rejected)) => {
                warn!(job_id = id, %rejected, "transition skipped");
                ActionOutcome::InvalidPrecondition {
                    status: rejected.from,
                }
            }
            Some(Ok(job)) => {
                info!(job_id = id, event = event.as_str(), status = %job.status, "job updated");
                shared.persist(&job).await;
                shared.notifier.notify();
                ActionOutcome::Applied
            }
        }
    }

    /// Moves a pending job to `Downloading`.
    ///
    /// With [`ManagerConfig::auto_start_worker`] set, also makes sure the
    /// worker loop runs.
    #[instrument(skip(self))]
    pub async fn start(&self, id: JobId) -> ActionOutcome {
        let outcome = self.transition(id, JobEvent::Start).await;
        if outcome.is_applied() && self.shared.config.auto_start_worker {
            self.ensure_worker();
        }
        outcome
    }

    /// Pauses a downloading job; its transfer is stopped.
    #[instrument(skip(self))]
    pub async fn pause(&self, id: JobId) -> ActionOutcome {
        self.transition(id, JobEvent::Pause).await
    }

    /// Resumes a paused or failed job from the beginning of the file.
    #[instrument(skip(self))]
    pub async fn resume(&self, id: JobId) -> ActionOutcome {
        let outcome = self.transition(id, JobEvent::Resume).await;
        if outcome.is_applied() && self.shared.config.auto_start_worker {
            self.ensure_worker();
        }
        outcome
    }

    /// Stops a downloading or paused job and resets it to `Pending`.
    ///
    /// The partially written file is left on disk.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: JobId) -> ActionOutcome {
        self.transition(id, JobEvent::Cancel).await
    }

    /// Removes a job from the registry and the store, stopping its transfer.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: JobId) -> ActionOutcome {
        let shared = &self.shared;
        if shared
            .registry
            .remove_with(id, |_| shared.cancel_active(id))
            .is_none()
        {
            debug!(job_id = id, "delete skipped, job not found");
            return ActionOutcome::NotFound;
        }

        match shared.store.delete(id).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => debug!(job_id = id, "job had no stored record"),
            Err(error) => warn!(job_id = id, %error, "failed to delete stored record"),
        }
        info!(job_id = id, "download deleted");
        shared.notifier.notify();
        ActionOutcome::Applied
    }

    /// Starts each id in order.
    pub async fn start_many(&self, ids: &[JobId]) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            outcomes.push(self.start(id).await);
        }
        outcomes
    }

    /// Pauses each id in order.
    pub async fn pause_many(&self, ids: &[JobId]) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            outcomes.push(self.pause(id).await);
        }
        outcomes
    }

    /// Resumes each id in order.
    pub async fn resume_many(&self, ids: &[JobId]) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            outcomes.push(self.resume(id).await);
        }
        outcomes
    }

    /// Cancels each id in order.
    pub async fn cancel_many(&self, ids: &[JobId]) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            outcomes.push(self.cancel(id).await);
        }
        outcomes
    }

    /// Deletes each id in order.
    pub async fn delete_many(&self, ids: &[JobId]) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            outcomes.push(self.delete(id).await);
        }
        outcomes
    }

    /// Returns a copy of the job with `id`.
    #[must_use]
    pub fn get_by_id(&self, id: JobId) -> Option<DownloadJob> {
        self.shared.registry.get(id)
    }

    /// Returns copies of all jobs in insertion order.
    #[must_use]
    pub fn list_all(&self) -> Vec<DownloadJob> {
        self.shared.registry.list_all()
    }

    /// Sets the global speed cap in KB/s; `0` means unlimited.
    ///
    /// Applies to attempts started after the call.
    pub fn set_speed_limit(&self, kbps: u64) {
        self.shared.executor.speed_limit().set(kbps);
        info!(kbps, "speed limit set");
        self.shared.notifier.notify();
    }

    /// Returns the speed cap in KB/s, or `None` if never set.
    #[must_use]
    pub fn speed_limit(&self) -> Option<u64> {
        self.shared.executor.speed_limit().get()
    }

    /// Subscribes to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.notifier.subscribe()
    }

    /// Number of transfers currently running.
    #[must_use]
    pub fn active_transfers(&self) -> usize {
        self.shared.active.len()
    }

    /// Probes a video URL with the external extractor.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ExternalToolMissing`] when no extractor is
    /// configured, or the probe's own error.
    pub async fn probe_video(&self, url: &str) -> Result<VideoInfo, TransferError> {
        let extractor = self
            .shared
            .executor
            .extractor()
            .ok_or(TransferError::ExternalToolMissing { path: None })?;
        extractor.video_info(url).await
    }

    /// Waits until no job is `Downloading` and no transfer is running.
    pub async fn wait_until_idle(&self) {
        let mut changes = self.subscribe();
        loop {
            let busy = !self
                .shared
                .registry
                .find_by_status(JobStatus::Downloading)
                .is_empty()
                || !self.shared.active.is_empty();
            if !busy {
                return;
            }
            // Transfers leave the active map after their final notification,
            // so fall back to polling at the idle interval.
            let _ = tokio::time::timeout(self.shared.config.idle_interval, changes.changed()).await;
        }
    }

    /// Stops the worker loop and waits for it, then gives cancelled
    /// transfers a bounded time to exit.
    pub async fn shutdown(&self) {
        let worker = self.worker().take();
        let Some(worker) = worker else {
            return;
        };
        worker.shutdown.cancel();
        if let Err(error) = worker.handle.await {
            warn!(%error, "worker loop ended abnormally");
        }

        let drained = tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, async {
            while !self.shared.active.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if drained.is_err() {
            warn!(active = self.shared.active.len(), "transfers still running after shutdown");
        }
        info!("download manager stopped");
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        if let Some(worker) = self.worker().as_ref() {
            worker.shutdown.cancel();
        }
    }
}
