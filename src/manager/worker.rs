//! Background worker loop and per-job transfer tasks.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ActiveTransfer, Shared};
use crate::job::{JobEvent, JobId, JobRegistry, JobStatus};
use crate::manager::notify::ChangeNotifier;
use crate::transfer::{ProgressReporter, ProgressSampler, TransferOutcome};

/// Runs until `shutdown` is cancelled, dispatching at most one job per scan.
pub(super) async fn run(shared: Arc<Shared>, shutdown: CancellationToken) {
    debug!("worker loop started");
    loop {
        let wait = if dispatch_next(&shared, &shutdown) {
            shared.config.dispatch_interval
        } else {
            shared.config.idle_interval
        };

        tokio::select! {
            () = shutdown.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }
    }
    debug!("worker loop stopped");
}

/// Spawns a transfer for the first `Downloading` job without one.
///
/// Returns `true` when a task was spawned.
fn dispatch_next(shared: &Arc<Shared>, shutdown: &CancellationToken) -> bool {
    if shared.active.len() >= shared.config.max_simultaneous_downloads {
        return false;
    }

    let Some(id) = shared
        .registry
        .find_by_status(JobStatus::Downloading)
        .into_iter()
        .find(|id| !shared.active.contains_key(id))
    else {
        return false;
    };

    let token = shutdown.child_token();
    let serial = shared.next_serial.fetch_add(1, Ordering::Relaxed);
    shared.active.insert(
        id,
        ActiveTransfer {
            token: token.clone(),
            serial,
        },
    );
    debug!(job_id = id, serial, "dispatching transfer");

    tokio::spawn(run_transfer(Arc::clone(shared), id, token, serial));
    true
}

async fn run_transfer(shared: Arc<Shared>, id: JobId, token: CancellationToken, serial: u64) {
    if let Some(job) = shared.registry.get(id)
        && job.status == JobStatus::Downloading
        && !token.is_cancelled()
    {
        let mut progress = JobProgress::new(&shared.registry, &shared.notifier, id, &token);
        let outcome = shared.executor.execute(&job, &token, &mut progress).await;
        finish(&shared, id, &token, outcome).await;
    }

    shared
        .active
        .remove_if(&id, |_, active| active.serial == serial);
}

/// Writes a transfer's terminal state back unless its token was cancelled.
async fn finish(shared: &Shared, id: JobId, token: &CancellationToken, outcome: TransferOutcome) {
    let event = match &outcome {
        TransferOutcome::Canceled => {
            debug!(job_id = id, "transfer canceled, nothing written");
            return;
        }
        TransferOutcome::Completed { bytes } => JobEvent::Complete { bytes: *bytes },
        TransferOutcome::Failed(_) => JobEvent::Fail,
    };

    let snapshot = shared.registry.update(id, |job| {
        if token.is_cancelled() {
            return None;
        }
        job.apply(event).ok().map(|_| job.clone())
    });
    let Some(Some(job)) = snapshot else {
        debug!(job_id = id, "job changed while transferring, outcome dropped");
        return;
    };

    match outcome {
        TransferOutcome::Completed { bytes } => {
            info!(job_id = id, name = %job.name, bytes, "download completed");
        }
        TransferOutcome::Failed(error) => {
            warn!(job_id = id, name = %job.name, %error, "download failed");
        }
        TransferOutcome::Canceled => {}
    }

    shared.persist(&job).await;
    shared.notifier.notify();
}

/// Applies progress reports to a registry entry.
///
/// Stops the transfer once the token is cancelled or the job left
/// `Downloading`; both are checked under the registry lock.
struct JobProgress<'a> {
    registry: &'a JobRegistry,
    notifier: &'a ChangeNotifier,
    id: JobId,
    token: &'a CancellationToken,
    sampler: ProgressSampler,
}

impl<'a> JobProgress<'a> {
    fn new(
        registry: &'a JobRegistry,
        notifier: &'a ChangeNotifier,
        id: JobId,
        token: &'a CancellationToken,
    ) -> Self {
        Self {
            registry,
            notifier,
            id,
            token,
            sampler: ProgressSampler::new(Instant::now()),
        }
    }
}

impl ProgressReporter for JobProgress<'_> {
    fn report(&mut self, expected: u64, transferred: u64) -> ControlFlow<()> {
        let speed = self.sampler.sample(Instant::now(), transferred);
        let token = self.token;

        let applied = self.registry.update(self.id, |job| {
            if token.is_cancelled() || job.status != JobStatus::Downloading {
                return false;
            }
            job.record_progress(expected, transferred);
            if let Some(speed) = speed {
                job.speed_bytes_per_sec = speed;
            }
            true
        });

        if applied != Some(true) {
            return ControlFlow::Break(());
        }
        if speed.is_some() {
            self.notifier.notify();
        }
        ControlFlow::Continue(())
    }
}
