//! Integration tests for the SQLite record store on a file-backed database.

use std::path::PathBuf;

use download_manager::{DownloadJob, JobStatus, RecordStore, SqliteStore, StoreError};
use tempfile::TempDir;

async fn file_store(dir: &TempDir) -> SqliteStore {
    SqliteStore::open(&dir.path().join("nested").join("downloads.db"))
        .await
        .expect("file database")
}

fn job(id: i64, name: &str) -> DownloadJob {
    let mut job = DownloadJob::new(name, format!("https://x.com/{name}"), "/downloads");
    job.id = id;
    job
}

#[tokio::test]
async fn test_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = file_store(&dir).await;
        let mut external = DownloadJob::new_external("clip.mp4", "https://v.test/1", "/videos", "720p");
        external.id = 2;
        store.create(&job(1, "a.zip")).await.unwrap();
        store.create(&external).await.unwrap();
        drop(store);
    }

    let store = file_store(&dir).await;
    let jobs = store.list_all().await.unwrap();

    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].name, "a.zip");
    assert_eq!(jobs[1].save_path, PathBuf::from("/videos"));
    assert!(jobs[1].is_external_extraction);
    assert_eq!(jobs[1].extraction_format.as_deref(), Some("720p"));
}

#[tokio::test]
async fn test_update_round_trips_progress_fields() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;
    let mut record = job(1, "big.iso");
    store.create(&record).await.unwrap();

    record.status = JobStatus::Paused;
    record.record_progress(1000, 420);
    store.update(&record).await.unwrap();

    let loaded = store.get_by_id(1).await.unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Paused);
    assert_eq!(loaded.progress, 42);
    assert_eq!(loaded.total_bytes, 1000);
    assert_eq!(loaded.downloaded_bytes, 420);
    assert_eq!(loaded.created_at.timestamp(), record.created_at.timestamp());
}

#[tokio::test]
async fn test_missing_rows_report_not_found() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;

    assert!(matches!(
        store.update(&job(9, "nope")).await,
        Err(StoreError::NotFound(9))
    ));
    assert!(matches!(store.delete(9).await, Err(StoreError::NotFound(9))));
    assert!(store.get_by_id(9).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_id_is_constraint_violation() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;
    store.create(&job(1, "a")).await.unwrap();

    let err = store.create(&job(1, "b")).await.unwrap_err();
    assert_eq!(
        err.database_kind(),
        Some(download_manager::store::StoreDbErrorKind::ConstraintViolation)
    );
}
