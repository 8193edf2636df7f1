//! In-memory collection of download jobs.
//!
//! The registry is the single source of truth for current job status. One
//! mutex guards the whole collection so every mutation is serialized; callers
//! never see the lock and only ever receive copies.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::model::{DownloadJob, JobId, JobStatus};

#[derive(Debug, Default)]
struct Inner {
    jobs: Vec<DownloadJob>,
    last_id: JobId,
}

/// Ordered, lock-guarded set of jobs with monotonic id assignment.
#[derive(Debug, Default)]
pub struct JobRegistry {
    inner: Mutex<Inner>,
}

impl JobRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Assigns the next id to `job`, appends it and returns the id.
    ///
    /// Ids start at 1 and never move backwards, so ids of removed jobs are
    /// not handed out again.
    pub fn add(&self, mut job: DownloadJob) -> JobId {
        let mut inner = self.lock();
        inner.last_id += 1;
        job.id = inner.last_id;
        let id = job.id;
        inner.jobs.push(job);
        debug!(job_id = id, "job registered");
        id
    }

    /// Inserts a job that already carries an id (e.g. loaded from storage).
    ///
    /// Returns `false` without inserting when the id is already present.
    pub fn insert_existing(&self, job: DownloadJob) -> bool {
        let mut inner = self.lock();
        if inner.jobs.iter().any(|existing| existing.id == job.id) {
            warn!(job_id = job.id, "duplicate job id ignored");
            return false;
        }
        inner.last_id = inner.last_id.max(job.id);
        inner.jobs.push(job);
        true
    }

    /// Returns a copy of the job with `id`.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<DownloadJob> {
        self.lock().jobs.iter().find(|job| job.id == id).cloned()
    }

    /// Applies `mutator` to the job with `id` while holding the lock.
    ///
    /// Returns the mutator's result, or `None` (logged) when the id is absent.
    pub fn update<R>(&self, id: JobId, mutator: impl FnOnce(&mut DownloadJob) -> R) -> Option<R> {
        let mut inner = self.lock();
        if let Some(job) = inner.jobs.iter_mut().find(|job| job.id == id) {
            Some(mutator(job))
        } else {
            debug!(job_id = id, "update skipped, job not in registry");
            None
        }
    }

    /// Removes the job with `id`. Returns `true` if it existed.
    pub fn remove(&self, id: JobId) -> bool {
        self.remove_with(id, |_| ()).is_some()
    }

    /// Runs `before_remove` on the job with `id` and removes it, all under one
    /// lock acquisition. Returns `None` when the id is absent.
    pub fn remove_with<R>(&self, id: JobId, before_remove: impl FnOnce(&DownloadJob) -> R) -> Option<R> {
        let mut inner = self.lock();
        let index = inner.jobs.iter().position(|job| job.id == id)?;
        let result = before_remove(&inner.jobs[index]);
        inner.jobs.remove(index);
        Some(result)
    }

    /// Returns copies of all jobs in insertion order.
    #[must_use]
    pub fn list_all(&self) -> Vec<DownloadJob> {
        self.lock().jobs.clone()
    }

    /// Returns the ids of jobs in `status`, in insertion order.
    #[must_use]
    pub fn find_by_status(&self, status: JobStatus) -> Vec<JobId> {
        self.lock()
            .jobs
            .iter()
            .filter(|job| job.status == status)
            .map(|job| job.id)
            .collect()
    }

    /// Number of jobs currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Returns `true` when no jobs are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn job(name: &str) -> DownloadJob {
        DownloadJob::new(name, format!("https://example.com/{name}"), "/tmp")
    }

    #[test]
    fn test_registry_add_assigns_increasing_ids_from_one() {
        let registry = JobRegistry::new();
        assert_eq!(registry.add(job("a")), 1);
        assert_eq!(registry.add(job("b")), 2);
        assert_eq!(registry.add(job("c")), 3);
    }

    #[test]
    fn test_registry_ids_not_reused_after_remove() {
        let registry = JobRegistry::new();
        registry.add(job("a"));
        let second = registry.add(job("b"));
        assert!(registry.remove(second));

        let third = registry.add(job("c"));
        assert_eq!(third, 3, "removed id must not be reused");
    }

    #[test]
    fn test_registry_insert_existing_advances_counter() {
        let registry = JobRegistry::new();
        let mut loaded = job("old");
        loaded.id = 41;
        assert!(registry.insert_existing(loaded.clone()));
        assert!(!registry.insert_existing(loaded), "duplicate id rejected");

        assert_eq!(registry.add(job("new")), 42);
    }

    #[test]
    fn test_registry_get_returns_copy() {
        let registry = JobRegistry::new();
        let id = registry.add(job("a"));

        let mut copy = registry.get(id).unwrap();
        copy.status = JobStatus::Failed;

        assert_eq!(registry.get(id).unwrap().status, JobStatus::Pending);
        assert!(registry.get(999).is_none());
    }

    #[test]
    fn test_registry_update_applies_mutation() {
        let registry = JobRegistry::new();
        let id = registry.add(job("a"));

        let result = registry.update(id, |job| {
            job.progress = 42;
            job.progress
        });

        assert_eq!(result, Some(42));
        assert_eq!(registry.get(id).unwrap().progress, 42);
    }

    #[test]
    fn test_registry_update_missing_id_is_noop() {
        let registry = JobRegistry::new();
        registry.add(job("a"));
        assert_eq!(registry.update(7, |job| job.progress = 1), None);
    }

    #[test]
    fn test_registry_remove_twice() {
        let registry = JobRegistry::new();
        let id = registry.add(job("a"));
        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_remove_with_sees_job_before_removal() {
        let registry = JobRegistry::new();
        let id = registry.add(job("a"));
        registry.update(id, |job| job.status = JobStatus::Downloading);

        let seen = registry.remove_with(id, |job| job.status);

        assert_eq!(seen, Some(JobStatus::Downloading));
        assert!(registry.get(id).is_none());
        assert_eq!(registry.remove_with(id, |_| ()), None);
    }

    #[test]
    fn test_registry_list_and_find_keep_insertion_order() {
        let registry = JobRegistry::new();
        let a = registry.add(job("a"));
        let b = registry.add(job("b"));
        let c = registry.add(job("c"));
        registry.update(b, |job| job.status = JobStatus::Downloading);
        registry.update(a, |job| job.status = JobStatus::Downloading);

        let names: Vec<_> = registry.list_all().into_iter().map(|j| j.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(registry.find_by_status(JobStatus::Downloading), vec![a, b]);
        assert_eq!(registry.find_by_status(JobStatus::Pending), vec![c]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_registry_concurrent_adds_get_unique_ids() {
        let registry = std::sync::Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = std::sync::Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|j| registry.add(job(&format!("{i}-{j}"))))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<JobId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 200);
    }
}
