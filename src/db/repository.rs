//! Repository pattern implementation for data access layer
//!
//! Per-entity repositories over the shared DatabaseManager. Job rows get
//! bespoke repositories without a delete operation: processing jobs are an
//! audit trail and are never removed by the core.

use crate::core::error::{LongboxError, Result};
use crate::db::manager::DatabaseManager;
use crate::db::models::{ConversionJob, Issue, Library, RenameJob, Volume};
use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;

/// Generic repository trait for CRUD operations
#[async_trait]
pub trait Repository<T>: Send + Sync {
    /// Find an entity by its ID
    async fn find_by_id(&self, id: &str) -> Result<Option<T>>;

    /// Find all entities
    async fn find_all(&self) -> Result<Vec<T>>;

    /// Create a new entity
    async fn create(&self, entity: &T) -> Result<()>;

    /// Update an existing entity
    async fn update(&self, entity: &T) -> Result<()>;

    /// Delete an entity by its ID
    async fn delete(&self, id: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Libraries

pub struct LibraryRepository {
    db: Arc<DatabaseManager>,
}

const LIBRARY_COLUMNS: &str = "id, name, root_path, settings, created_at";

fn library_from_row(row: &Row<'_>) -> rusqlite::Result<Library> {
    Ok(Library {
        id: row.get(0)?,
        name: row.get(1)?,
        root_path: row.get(2)?,
        settings: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl LibraryRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Repository<Library> for LibraryRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Library>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM libraries WHERE id = ?", LIBRARY_COLUMNS),
                    [&id],
                    library_from_row,
                )
                .optional()
                .map_err(LongboxError::DatabaseError)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Library>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM libraries ORDER BY name",
                        LIBRARY_COLUMNS
                    ))
                    .map_err(LongboxError::DatabaseError)?;
                let rows = stmt
                    .query_map([], library_from_row)
                    .map_err(LongboxError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LongboxError::DatabaseError)?;
                Ok(rows)
            })
            .await
    }

    async fn create(&self, entity: &Library) -> Result<()> {
        let entity = entity.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO libraries (id, name, root_path, settings, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        entity.id,
                        entity.name,
                        entity.root_path,
                        entity.settings,
                        entity.created_at
                    ],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    async fn update(&self, entity: &Library) -> Result<()> {
        let entity = entity.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE libraries SET name = ?2, root_path = ?3, settings = ?4 WHERE id = ?1",
                    params![entity.id, entity.name, entity.root_path, entity.settings],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("DELETE FROM libraries WHERE id = ?", [&id])
                    .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Volumes

pub struct VolumeRepository {
    db: Arc<DatabaseManager>,
}

const VOLUME_COLUMNS: &str =
    "id, library_id, title, volume_number, year, publisher, special_version, folder, created_at";

fn volume_from_row(row: &Row<'_>) -> rusqlite::Result<Volume> {
    Ok(Volume {
        id: row.get(0)?,
        library_id: row.get(1)?,
        title: row.get(2)?,
        volume_number: row.get(3)?,
        year: row.get(4)?,
        publisher: row.get(5)?,
        special_version: row.get(6)?,
        folder: row.get(7)?,
        created_at: row.get(8)?,
    })
}

impl VolumeRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Find volumes belonging to a library
    pub async fn find_by_library(&self, library_id: &str) -> Result<Vec<Volume>> {
        let library_id = library_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM volumes WHERE library_id = ? ORDER BY title",
                        VOLUME_COLUMNS
                    ))
                    .map_err(LongboxError::DatabaseError)?;
                let rows = stmt
                    .query_map([&library_id], volume_from_row)
                    .map_err(LongboxError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LongboxError::DatabaseError)?;
                Ok(rows)
            })
            .await
    }
}

#[async_trait]
impl Repository<Volume> for VolumeRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Volume>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM volumes WHERE id = ?", VOLUME_COLUMNS),
                    [&id],
                    volume_from_row,
                )
                .optional()
                .map_err(LongboxError::DatabaseError)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Volume>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(&format!("SELECT {} FROM volumes ORDER BY title", VOLUME_COLUMNS))
                    .map_err(LongboxError::DatabaseError)?;
                let rows = stmt
                    .query_map([], volume_from_row)
                    .map_err(LongboxError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LongboxError::DatabaseError)?;
                Ok(rows)
            })
            .await
    }

    async fn create(&self, entity: &Volume) -> Result<()> {
        let entity = entity.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO volumes (id, library_id, title, volume_number, year, publisher, \
                     special_version, folder, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        entity.id,
                        entity.library_id,
                        entity.title,
                        entity.volume_number,
                        entity.year,
                        entity.publisher,
                        entity.special_version,
                        entity.folder,
                        entity.created_at
                    ],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    async fn update(&self, entity: &Volume) -> Result<()> {
        let entity = entity.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE volumes SET title = ?2, volume_number = ?3, year = ?4, \
                     publisher = ?5, special_version = ?6, folder = ?7 WHERE id = ?1",
                    params![
                        entity.id,
                        entity.title,
                        entity.volume_number,
                        entity.year,
                        entity.publisher,
                        entity.special_version,
                        entity.folder
                    ],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("DELETE FROM volumes WHERE id = ?", [&id])
                    .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Issues

pub struct IssueRepository {
    db: Arc<DatabaseManager>,
}

const ISSUE_COLUMNS: &str =
    "id, volume_id, issue_number, title, release_date, file_path, status, created_at";

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        volume_id: row.get(1)?,
        issue_number: row.get(2)?,
        title: row.get(3)?,
        release_date: row.get(4)?,
        file_path: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

impl IssueRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    /// Find issues belonging to a volume
    pub async fn find_by_volume(&self, volume_id: &str) -> Result<Vec<Issue>> {
        let volume_id = volume_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM issues WHERE volume_id = ? ORDER BY issue_number",
                        ISSUE_COLUMNS
                    ))
                    .map_err(LongboxError::DatabaseError)?;
                let rows = stmt
                    .query_map([&volume_id], issue_from_row)
                    .map_err(LongboxError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LongboxError::DatabaseError)?;
                Ok(rows)
            })
            .await
    }

    /// Update the file path and status after a pipeline stage touched the file
    pub async fn update_file(&self, id: &str, file_path: &str, status: &str) -> Result<()> {
        let id = id.to_string();
        let file_path = file_path.to_string();
        let status = status.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE issues SET file_path = ?2, status = ?3 WHERE id = ?1",
                    params![id, file_path, status],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl Repository<Issue> for IssueRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<Issue>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM issues WHERE id = ?", ISSUE_COLUMNS),
                    [&id],
                    issue_from_row,
                )
                .optional()
                .map_err(LongboxError::DatabaseError)
            })
            .await
    }

    async fn find_all(&self) -> Result<Vec<Issue>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(&format!("SELECT {} FROM issues", ISSUE_COLUMNS))
                    .map_err(LongboxError::DatabaseError)?;
                let rows = stmt
                    .query_map([], issue_from_row)
                    .map_err(LongboxError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LongboxError::DatabaseError)?;
                Ok(rows)
            })
            .await
    }

    async fn create(&self, entity: &Issue) -> Result<()> {
        let entity = entity.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO issues (id, volume_id, issue_number, title, release_date, \
                     file_path, status, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        entity.id,
                        entity.volume_id,
                        entity.issue_number,
                        entity.title,
                        entity.release_date,
                        entity.file_path,
                        entity.status,
                        entity.created_at
                    ],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    async fn update(&self, entity: &Issue) -> Result<()> {
        let entity = entity.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE issues SET issue_number = ?2, title = ?3, release_date = ?4, \
                     file_path = ?5, status = ?6 WHERE id = ?1",
                    params![
                        entity.id,
                        entity.issue_number,
                        entity.title,
                        entity.release_date,
                        entity.file_path,
                        entity.status
                    ],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("DELETE FROM issues WHERE id = ?", [&id])
                    .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Rename jobs

pub struct RenameJobRepository {
    db: Arc<DatabaseManager>,
}

const RENAME_JOB_COLUMNS: &str = "id, volume_id, issue_id, issue_number, source_file_path, \
     target_file_path, status, error, updated_at, created_at";

fn rename_job_from_row(row: &Row<'_>) -> rusqlite::Result<RenameJob> {
    Ok(RenameJob {
        id: row.get(0)?,
        volume_id: row.get(1)?,
        issue_id: row.get(2)?,
        issue_number: row.get(3)?,
        source_file_path: row.get(4)?,
        target_file_path: row.get(5)?,
        status: row.get(6)?,
        error: row.get(7)?,
        updated_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl RenameJobRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<RenameJob>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM rename_jobs WHERE id = ?", RENAME_JOB_COLUMNS),
                    [&id],
                    rename_job_from_row,
                )
                .optional()
                .map_err(LongboxError::DatabaseError)
            })
            .await
    }

    pub async fn create(&self, job: &RenameJob) -> Result<()> {
        let job = job.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO rename_jobs (id, volume_id, issue_id, issue_number, \
                     source_file_path, target_file_path, status, error, updated_at, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        job.id,
                        job.volume_id,
                        job.issue_id,
                        job.issue_number,
                        job.source_file_path,
                        job.target_file_path,
                        job.status,
                        job.error,
                        job.updated_at,
                        job.created_at
                    ],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    pub async fn update(&self, job: &RenameJob) -> Result<()> {
        let job = job.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE rename_jobs SET status = ?2, error = ?3, target_file_path = ?4, \
                     updated_at = ?5 WHERE id = ?1",
                    params![job.id, job.status, job.error, job.target_file_path, job.updated_at],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    /// Check for an active (queued/in-progress/retry) job for an issue
    pub async fn has_active_for_issue(&self, issue_id: &str) -> Result<bool> {
        let issue_id = issue_id.to_string();
        self.db
            .execute(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM rename_jobs WHERE issue_id = ? \
                         AND status NOT IN ('completed', 'failed')",
                        [&issue_id],
                        |row| row.get(0),
                    )
                    .map_err(LongboxError::DatabaseError)?;
                Ok(count > 0)
            })
            .await
    }

    /// Jobs a cold start should re-dispatch
    pub async fn find_processable(&self) -> Result<Vec<RenameJob>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM rename_jobs WHERE status IN ('queued', 'retry') \
                         ORDER BY created_at",
                        RENAME_JOB_COLUMNS
                    ))
                    .map_err(LongboxError::DatabaseError)?;
                let rows = stmt
                    .query_map([], rename_job_from_row)
                    .map_err(LongboxError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LongboxError::DatabaseError)?;
                Ok(rows)
            })
            .await
    }

    pub async fn count_for_issue(&self, issue_id: &str) -> Result<i64> {
        let issue_id = issue_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM rename_jobs WHERE issue_id = ?",
                    [&issue_id],
                    |row| row.get(0),
                )
                .map_err(LongboxError::DatabaseError)
            })
            .await
    }
}

// ---------------------------------------------------------------------------
// Conversion jobs

pub struct ConversionJobRepository {
    db: Arc<DatabaseManager>,
}

const CONVERSION_JOB_COLUMNS: &str = "id, volume_id, issue_id, issue_number, source_file_path, \
     target_file_path, target_format, status, error, updated_at, created_at";

fn conversion_job_from_row(row: &Row<'_>) -> rusqlite::Result<ConversionJob> {
    Ok(ConversionJob {
        id: row.get(0)?,
        volume_id: row.get(1)?,
        issue_id: row.get(2)?,
        issue_number: row.get(3)?,
        source_file_path: row.get(4)?,
        target_file_path: row.get(5)?,
        target_format: row.get(6)?,
        status: row.get(7)?,
        error: row.get(8)?,
        updated_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl ConversionJobRepository {
    pub fn new(db: Arc<DatabaseManager>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<ConversionJob>> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {} FROM conversion_jobs WHERE id = ?",
                        CONVERSION_JOB_COLUMNS
                    ),
                    [&id],
                    conversion_job_from_row,
                )
                .optional()
                .map_err(LongboxError::DatabaseError)
            })
            .await
    }

    pub async fn create(&self, job: &ConversionJob) -> Result<()> {
        let job = job.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO conversion_jobs (id, volume_id, issue_id, issue_number, \
                     source_file_path, target_file_path, target_format, status, error, \
                     updated_at, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        job.id,
                        job.volume_id,
                        job.issue_id,
                        job.issue_number,
                        job.source_file_path,
                        job.target_file_path,
                        job.target_format,
                        job.status,
                        job.error,
                        job.updated_at,
                        job.created_at
                    ],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    pub async fn update(&self, job: &ConversionJob) -> Result<()> {
        let job = job.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE conversion_jobs SET status = ?2, error = ?3, target_file_path = ?4, \
                     updated_at = ?5 WHERE id = ?1",
                    params![job.id, job.status, job.error, job.target_file_path, job.updated_at],
                )
                .map_err(LongboxError::DatabaseError)?;
                Ok(())
            })
            .await
    }

    /// Check for an active (queued/in-progress/retry) job for an issue
    pub async fn has_active_for_issue(&self, issue_id: &str) -> Result<bool> {
        let issue_id = issue_id.to_string();
        self.db
            .execute(move |conn| {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM conversion_jobs WHERE issue_id = ? \
                         AND status NOT IN ('completed', 'failed')",
                        [&issue_id],
                        |row| row.get(0),
                    )
                    .map_err(LongboxError::DatabaseError)?;
                Ok(count > 0)
            })
            .await
    }

    /// Jobs a cold start should re-dispatch
    pub async fn find_processable(&self) -> Result<Vec<ConversionJob>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {} FROM conversion_jobs WHERE status IN ('queued', 'retry') \
                         ORDER BY created_at",
                        CONVERSION_JOB_COLUMNS
                    ))
                    .map_err(LongboxError::DatabaseError)?;
                let rows = stmt
                    .query_map([], conversion_job_from_row)
                    .map_err(LongboxError::DatabaseError)?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(LongboxError::DatabaseError)?;
                Ok(rows)
            })
            .await
    }

    pub async fn count_for_issue(&self, issue_id: &str) -> Result<i64> {
        let issue_id = issue_id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM conversion_jobs WHERE issue_id = ?",
                    [&issue_id],
                    |row| row.get(0),
                )
                .map_err(LongboxError::DatabaseError)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::JobStatus;

    async fn test_db() -> Arc<DatabaseManager> {
        Arc::new(DatabaseManager::new_in_memory().unwrap())
    }

    fn sample_library() -> Library {
        Library {
            id: "lib-1".to_string(),
            name: "Comics".to_string(),
            root_path: "/comics".to_string(),
            settings: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn sample_volume() -> Volume {
        Volume {
            id: "vol-1".to_string(),
            library_id: "lib-1".to_string(),
            title: "Saga".to_string(),
            volume_number: Some(1),
            year: Some(2012),
            publisher: Some("Image".to_string()),
            special_version: None,
            folder: None,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn sample_issue() -> Issue {
        Issue {
            id: "iss-1".to_string(),
            volume_id: "vol-1".to_string(),
            issue_number: Some("1".to_string()),
            title: None,
            release_date: Some("2012-03-14".to_string()),
            file_path: Some("downloads/saga_1.cbz".to_string()),
            status: "downloaded".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn sample_rename_job(id: &str, status: JobStatus) -> RenameJob {
        RenameJob {
            id: id.to_string(),
            volume_id: "vol-1".to_string(),
            issue_id: "iss-1".to_string(),
            issue_number: Some("1".to_string()),
            source_file_path: "downloads/saga_1.cbz".to_string(),
            target_file_path: None,
            status: status.as_str().to_string(),
            error: None,
            updated_at: 1700000000,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    async fn seed_hierarchy(db: &Arc<DatabaseManager>) {
        LibraryRepository::new(db.clone())
            .create(&sample_library())
            .await
            .unwrap();
        VolumeRepository::new(db.clone())
            .create(&sample_volume())
            .await
            .unwrap();
        IssueRepository::new(db.clone())
            .create(&sample_issue())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_library_round_trip() {
        let db = test_db().await;
        let repo = LibraryRepository::new(db);

        repo.create(&sample_library()).await.unwrap();
        let found = repo.find_by_id("lib-1").await.unwrap().unwrap();
        assert_eq!(found.name, "Comics");
        assert!(found.settings.is_none());

        let mut updated = found;
        updated.settings = Some(r#"{"convert": true}"#.to_string());
        repo.update(&updated).await.unwrap();
        let found = repo.find_by_id("lib-1").await.unwrap().unwrap();
        assert!(found.settings.unwrap().contains("convert"));
    }

    #[tokio::test]
    async fn test_volume_and_issue_round_trip() {
        let db = test_db().await;
        seed_hierarchy(&db).await;

        let volumes = VolumeRepository::new(db.clone())
            .find_by_library("lib-1")
            .await
            .unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].title, "Saga");

        let issue_repo = IssueRepository::new(db);
        let issues = issue_repo.find_by_volume("vol-1").await.unwrap();
        assert_eq!(issues.len(), 1);

        issue_repo
            .update_file("iss-1", "Saga/Volume 1 (2012)/Saga (2012) Issue 1.cbz", "ready")
            .await
            .unwrap();
        let issue = issue_repo.find_by_id("iss-1").await.unwrap().unwrap();
        assert_eq!(issue.status, "ready");
        assert!(issue.file_path.unwrap().starts_with("Saga/"));
    }

    #[tokio::test]
    async fn test_rename_job_round_trip_and_active_query() {
        let db = test_db().await;
        seed_hierarchy(&db).await;
        let repo = RenameJobRepository::new(db);

        assert!(!repo.has_active_for_issue("iss-1").await.unwrap());

        repo.create(&sample_rename_job("job-1", JobStatus::Queued))
            .await
            .unwrap();
        assert!(repo.has_active_for_issue("iss-1").await.unwrap());

        let mut job = repo.find_by_id("job-1").await.unwrap().unwrap();
        job.status = JobStatus::Completed.as_str().to_string();
        job.target_file_path = Some("Saga/Saga (2012) Issue 1.cbz".to_string());
        repo.update(&job).await.unwrap();

        assert!(!repo.has_active_for_issue("iss-1").await.unwrap());
        assert_eq!(repo.count_for_issue("iss-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_jobs_are_not_active() {
        let db = test_db().await;
        seed_hierarchy(&db).await;
        let repo = RenameJobRepository::new(db);

        let mut job = sample_rename_job("job-1", JobStatus::Failed);
        job.error = Some("source file missing".to_string());
        repo.create(&job).await.unwrap();

        assert!(!repo.has_active_for_issue("iss-1").await.unwrap());
        let found = repo.find_by_id("job-1").await.unwrap().unwrap();
        assert_eq!(found.error.as_deref(), Some("source file missing"));
    }

    #[tokio::test]
    async fn test_find_processable_includes_retry() {
        let db = test_db().await;
        seed_hierarchy(&db).await;
        let repo = RenameJobRepository::new(db);

        repo.create(&sample_rename_job("job-q", JobStatus::Queued))
            .await
            .unwrap();
        repo.create(&sample_rename_job("job-r", JobStatus::Retry))
            .await
            .unwrap();
        repo.create(&sample_rename_job("job-c", JobStatus::Completed))
            .await
            .unwrap();

        let processable = repo.find_processable().await.unwrap();
        let ids: Vec<&str> = processable.iter().map(|j| j.id.as_str()).collect();
        assert!(ids.contains(&"job-q"));
        assert!(ids.contains(&"job-r"));
        assert!(!ids.contains(&"job-c"));
    }

    #[tokio::test]
    async fn test_conversion_job_round_trip() {
        let db = test_db().await;
        seed_hierarchy(&db).await;
        let repo = ConversionJobRepository::new(db);

        let job = ConversionJob {
            id: "cjob-1".to_string(),
            volume_id: "vol-1".to_string(),
            issue_id: "iss-1".to_string(),
            issue_number: Some("1".to_string()),
            source_file_path: "downloads/saga_1.zip".to_string(),
            target_file_path: None,
            target_format: "cbz".to_string(),
            status: JobStatus::Queued.as_str().to_string(),
            error: None,
            updated_at: 1700000000,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        };
        repo.create(&job).await.unwrap();

        assert!(repo.has_active_for_issue("iss-1").await.unwrap());
        let found = repo.find_by_id("cjob-1").await.unwrap().unwrap();
        assert_eq!(found.target_format, "cbz");
    }
}
