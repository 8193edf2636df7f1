//! `SQLite`-backed record store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, instrument, warn};

use super::{RecordStore, Result, StoreError, StoreOpenError};
use crate::job::{DownloadJob, JobId, JobStatus};

/// Pool size for file databases. SQLite locks the whole file on write.
const MAX_CONNECTIONS: u32 = 5;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Returns `Ok(())` if at least one row was affected; otherwise [`StoreError::NotFound`].
fn check_affected(id: JobId, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(id))
    } else {
        Ok(())
    }
}

fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// A row of the `downloads` table.
#[derive(Debug, Clone, FromRow)]
struct DownloadRow {
    id: i64,
    name: String,
    url: String,
    save_path: String,
    #[sqlx(rename = "status")]
    status_str: String,
    progress: i64,
    size: i64,
    downloaded_size: i64,
    date_added: String,
    is_external: bool,
    extraction_format: Option<String>,
}

impl DownloadRow {
    /// Parses the status string, falling back to `Pending` for unknown values.
    fn status(&self) -> JobStatus {
        self.status_str.parse().unwrap_or_else(|_| {
            warn!(job_id = self.id, status = %self.status_str, "unknown stored status, using pending");
            JobStatus::Pending
        })
    }

    fn created_at(&self) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&self.date_added).map_or_else(
            |_| {
                warn!(job_id = self.id, date_added = %self.date_added, "unparseable date, using now");
                Utc::now()
            },
            |dt| dt.with_timezone(&Utc),
        )
    }

    fn into_job(self) -> DownloadJob {
        let status = self.status();
        let created_at = self.created_at();
        let progress = u8::try_from(self.progress.clamp(0, 100)).unwrap_or(0);
        DownloadJob {
            id: self.id,
            name: self.name,
            url: self.url,
            save_path: PathBuf::from(self.save_path),
            status,
            progress,
            total_bytes: from_db_int(self.size),
            downloaded_bytes: from_db_int(self.downloaded_size),
            speed_bytes_per_sec: 0,
            created_at,
            is_external_extraction: self.is_external,
            extraction_format: self.extraction_format,
        }
    }
}

/// Record store persisting jobs in the `downloads` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database file at `path` in WAL mode
    /// and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpenError`] if the parent directory cannot be created,
    /// the file cannot be opened, or a migration fails.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub async fn open(path: &Path) -> std::result::Result<Self, StoreOpenError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreOpenError::Directory {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!("downloads database ready");
        Ok(Self { pool })
    }

    /// Opens a private in-memory database, used by tests.
    ///
    /// A single connection keeps every query on the same memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreOpenError`] if the connection or migration fails.
    pub async fn open_in_memory() -> std::result::Result<Self, StoreOpenError> {
        let options: SqliteConnectOptions = "sqlite::memory:".parse()?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    #[instrument(skip(self, job), fields(job_id = job.id))]
    async fn create(&self, job: &DownloadJob) -> Result<()> {
        sqlx::query(
            r"INSERT INTO downloads
              (id, name, url, save_path, status, progress, size, downloaded_size,
               date_added, is_external, extraction_format)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.url)
        .bind(job.save_path.to_string_lossy().into_owned())
        .bind(job.status.as_str())
        .bind(i64::from(job.progress))
        .bind(to_db_int(job.total_bytes))
        .bind(to_db_int(job.downloaded_bytes))
        .bind(job.created_at.to_rfc3339())
        .bind(job.is_external_extraction)
        .bind(job.extraction_format.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = job.id, status = %job.status))]
    async fn update(&self, job: &DownloadJob) -> Result<()> {
        let result = sqlx::query(
            r"UPDATE downloads
              SET name = ?, save_path = ?, status = ?, progress = ?, size = ?,
                  downloaded_size = ?, is_external = ?, extraction_format = ?
              WHERE id = ?",
        )
        .bind(&job.name)
        .bind(job.save_path.to_string_lossy().into_owned())
        .bind(job.status.as_str())
        .bind(i64::from(job.progress))
        .bind(to_db_int(job.total_bytes))
        .bind(to_db_int(job.downloaded_bytes))
        .bind(job.is_external_extraction)
        .bind(job.extraction_format.as_deref())
        .bind(job.id)
        .execute(&self.pool)
        .await?;

        check_affected(job.id, result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: JobId) -> Result<()> {
        let result = sqlx::query("DELETE FROM downloads WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        check_affected(id, result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<DownloadJob>> {
        let rows = sqlx::query_as::<_, DownloadRow>("SELECT * FROM downloads ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(DownloadRow::into_job).collect())
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, id: JobId) -> Result<Option<DownloadJob>> {
        let row = sqlx::query_as::<_, DownloadRow>("SELECT * FROM downloads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(DownloadRow::into_job))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::open_in_memory().await.unwrap()
    }

    fn job(id: JobId, name: &str) -> DownloadJob {
        let mut job = DownloadJob::new(name, format!("https://example.com/{name}"), "/tmp/dl");
        job.id = id;
        job
    }

    #[tokio::test]
    async fn test_sqlite_store_create_and_get() {
        let store = store().await;
        let original = job(1, "a.bin");
        store.create(&original).await.unwrap();

        let loaded = store.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(loaded.name, "a.bin");
        assert_eq!(loaded.url, "https://example.com/a.bin");
        assert_eq!(loaded.save_path, PathBuf::from("/tmp/dl"));
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.created_at.timestamp(), original.created_at.timestamp());
        assert!(!loaded.is_external_extraction);
    }

    #[tokio::test]
    async fn test_sqlite_store_get_missing_returns_none() {
        let store = store().await;
        assert!(store.get_by_id(5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_store_create_duplicate_id_is_constraint_violation() {
        let store = store().await;
        store.create(&job(1, "a")).await.unwrap();
        let err = store.create(&job(1, "b")).await.unwrap_err();
        assert_eq!(
            err.database_kind(),
            Some(crate::store::StoreDbErrorKind::ConstraintViolation)
        );
    }

    #[tokio::test]
    async fn test_sqlite_store_update_persists_counters() {
        let store = store().await;
        let mut record = job(1, "a");
        store.create(&record).await.unwrap();

        record.status = JobStatus::Downloading;
        record.mark_completed(2048);
        store.update(&record).await.unwrap();

        let loaded = store.get_by_id(1).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.progress, 100);
        assert_eq!(loaded.total_bytes, 2048);
        assert_eq!(loaded.downloaded_bytes, 2048);
    }

    #[tokio::test]
    async fn test_sqlite_store_update_missing_is_not_found() {
        let store = store().await;
        let err = store.update(&job(9, "x")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(9)));
    }

    #[tokio::test]
    async fn test_sqlite_store_delete_twice() {
        let store = store().await;
        store.create(&job(1, "a")).await.unwrap();
        store.delete(1).await.unwrap();
        assert!(matches!(store.delete(1).await, Err(StoreError::NotFound(1))));
    }

    #[tokio::test]
    async fn test_sqlite_store_list_all_ordered_by_id() {
        let store = store().await;
        store.create(&job(3, "c")).await.unwrap();
        store.create(&job(1, "a")).await.unwrap();
        store.create(&job(2, "b")).await.unwrap();

        let ids: Vec<_> = store.list_all().await.unwrap().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_sqlite_store_external_fields_round_trip() {
        let store = store().await;
        let mut record = DownloadJob::new_external("clip.mp4", "https://v.test/x", "/tmp", "720p");
        record.id = 4;
        store.create(&record).await.unwrap();

        let loaded = store.get_by_id(4).await.unwrap().unwrap();
        assert!(loaded.is_external_extraction);
        assert_eq!(loaded.extraction_format.as_deref(), Some("720p"));
    }

    #[tokio::test]
    async fn test_sqlite_store_unparseable_date_falls_back() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO downloads (id, name, url, save_path, date_added) \
             VALUES (1, 'a', 'u', '/tmp', 'yesterday')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let loaded = store.get_by_id(1).await.unwrap().unwrap();
        assert!(loaded.created_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_sqlite_store_rejects_unknown_status_column() {
        let store = store().await;
        let result = sqlx::query(
            "INSERT INTO downloads (id, name, url, save_path, status, date_added) \
             VALUES (1, 'a', 'u', '/tmp', 'exploded', '2025-01-01T00:00:00Z')",
        )
        .execute(&store.pool)
        .await;

        assert!(result.is_err(), "status outside the known set must be rejected");
    }

    #[tokio::test]
    async fn test_sqlite_store_open_creates_file_in_wal_mode() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("downloads.db");
        let store = SqliteStore::open(&path).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_sqlite_store_open_reports_unusable_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = SqliteStore::open(&blocker.join("downloads.db")).await.unwrap_err();
        assert!(matches!(err, StoreOpenError::Directory { .. }));
    }
}
