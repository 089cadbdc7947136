//! Database migrations
//!
//! Versioned schema migrations tracked in a `schema_migrations` table.
//! Each version applies once; reruns are no-ops.

use crate::core::error::{Result, LongboxError};
use rusqlite::Connection;
use tracing::{debug, info};

/// Migration version tracking table
const MIGRATION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
)
"#;

/// Initial schema (version 1)
const MIGRATION_V1: &str = r#"
-- Libraries table
CREATE TABLE IF NOT EXISTS libraries (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    root_path TEXT NOT NULL,
    settings TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- Volumes table
CREATE TABLE IF NOT EXISTS volumes (
    id TEXT PRIMARY KEY,
    library_id TEXT NOT NULL,
    title TEXT NOT NULL,
    volume_number INTEGER,
    year INTEGER,
    publisher TEXT,
    special_version TEXT,
    folder TEXT,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (library_id) REFERENCES libraries(id) ON DELETE CASCADE
);

-- Issues table
CREATE TABLE IF NOT EXISTS issues (
    id TEXT PRIMARY KEY,
    volume_id TEXT NOT NULL,
    issue_number TEXT,
    title TEXT,
    release_date TEXT,
    file_path TEXT,
    status TEXT NOT NULL DEFAULT 'downloaded',
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (volume_id) REFERENCES volumes(id) ON DELETE CASCADE
);

-- Rename jobs table
CREATE TABLE IF NOT EXISTS rename_jobs (
    id TEXT PRIMARY KEY,
    volume_id TEXT NOT NULL,
    issue_id TEXT NOT NULL,
    issue_number TEXT,
    source_file_path TEXT NOT NULL,
    target_file_path TEXT,
    status TEXT NOT NULL DEFAULT 'queued',
    error TEXT,
    updated_at INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
);

-- Conversion jobs table
CREATE TABLE IF NOT EXISTS conversion_jobs (
    id TEXT PRIMARY KEY,
    volume_id TEXT NOT NULL,
    issue_id TEXT NOT NULL,
    issue_number TEXT,
    source_file_path TEXT NOT NULL,
    target_file_path TEXT,
    target_format TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'queued',
    error TEXT,
    updated_at INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (issue_id) REFERENCES issues(id) ON DELETE CASCADE
);
"#;

/// Job lookup indexes (version 2)
///
/// The workers query jobs by (issue_id, status) on every enqueue and by
/// status on every recovery scan.
const MIGRATION_V2: &str = r#"
CREATE INDEX IF NOT EXISTS idx_rename_jobs_issue_status
    ON rename_jobs(issue_id, status);
CREATE INDEX IF NOT EXISTS idx_rename_jobs_status
    ON rename_jobs(status);
CREATE INDEX IF NOT EXISTS idx_conversion_jobs_issue_status
    ON conversion_jobs(issue_id, status);
CREATE INDEX IF NOT EXISTS idx_conversion_jobs_status
    ON conversion_jobs(status);
CREATE INDEX IF NOT EXISTS idx_volumes_library
    ON volumes(library_id);
CREATE INDEX IF NOT EXISTS idx_issues_volume
    ON issues(volume_id);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1), (2, MIGRATION_V2)];

/// Apply all pending migrations
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(MIGRATION_TABLE)
        .map_err(LongboxError::DatabaseError)?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(LongboxError::DatabaseError)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            debug!(version = version, "Migration already applied");
            continue;
        }

        info!(version = version, "Applying migration");
        let tx = conn.transaction().map_err(LongboxError::DatabaseError)?;
        tx.execute_batch(sql).map_err(LongboxError::DatabaseError)?;
        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?)",
            [version],
        )
        .map_err(LongboxError::DatabaseError)?;
        tx.commit().map_err(LongboxError::DatabaseError)?;
    }

    Ok(())
}
