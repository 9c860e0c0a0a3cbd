use crate::db::sqlite_error;
use repomirror_core::error::StateError;
use repomirror_core::time::now_iso8601;
use repomirror_core::types::{RepositoryMetadata, SyncStats};
use rusqlite::{Connection, OptionalExtension, Row, params};

const REPO_COLUMNS: &str = "name, url, default_branch, last_commit, last_synced_at,
     last_sync_status, last_sync_stats, file_count, created_at, updated_at";

/// Outcome of a finished import or delta sync, written in one statement.
#[derive(Debug, Clone)]
pub struct SyncRecord<'a> {
    pub name: &'a str,
    /// Only overwrites the stored url when present.
    pub url: Option<&'a str>,
    pub default_branch: Option<&'a str>,
    pub commit: &'a str,
    pub status: &'a str,
    pub stats: &'a SyncStats,
}

/// Upsert repository metadata after a completed import or sync.
///
/// `file_count` is recomputed from `indexed_files` so it always reflects the
/// records actually present.
pub fn record_sync(conn: &Connection, record: &SyncRecord<'_>) -> Result<(), StateError> {
    let stats_json =
        serde_json::to_string(record.stats).map_err(StateError::serialization)?;
    let now = now_iso8601();
    conn.execute(
        "INSERT INTO repositories (
             name, url, default_branch, last_commit, last_synced_at,
             last_sync_status, last_sync_stats, file_count, created_at, updated_at
         ) VALUES (
             ?1, ?2, ?3, ?4, ?5, ?6, ?7,
             (SELECT COUNT(*) FROM indexed_files WHERE repo = ?1),
             ?5, ?5
         )
         ON CONFLICT(name) DO UPDATE SET
             url = COALESCE(excluded.url, repositories.url),
             default_branch = COALESCE(excluded.default_branch, repositories.default_branch),
             last_commit = excluded.last_commit,
             last_synced_at = excluded.last_synced_at,
             last_sync_status = excluded.last_sync_status,
             last_sync_stats = excluded.last_sync_stats,
             file_count = excluded.file_count,
             updated_at = excluded.updated_at",
        params![
            record.name,
            record.url,
            record.default_branch,
            record.commit,
            now,
            record.status,
            stats_json,
        ],
    )
    .map_err(sqlite_error)?;
    Ok(())
}

pub fn get_repository(
    conn: &Connection,
    name: &str,
) -> Result<Option<RepositoryMetadata>, StateError> {
    conn.query_row(
        &format!("SELECT {REPO_COLUMNS} FROM repositories WHERE name = ?1"),
        params![name],
        row_to_repository,
    )
    .optional()
    .map_err(sqlite_error)
}

pub fn list_repositories(conn: &Connection) -> Result<Vec<RepositoryMetadata>, StateError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {REPO_COLUMNS} FROM repositories ORDER BY name ASC"
        ))
        .map_err(sqlite_error)?;
    let rows = stmt
        .query_map([], row_to_repository)
        .map_err(sqlite_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sqlite_error)
}

/// Last synchronized revision for a repository, if any.
pub fn last_commit(conn: &Connection, name: &str) -> Result<Option<String>, StateError> {
    Ok(get_repository(conn, name)?.and_then(|repo| repo.last_commit))
}

/// Delete a repository's metadata and all of its file records.
pub fn delete_repository(conn: &Connection, name: &str) -> Result<bool, StateError> {
    conn.execute("DELETE FROM indexed_files WHERE repo = ?1", params![name])
        .map_err(sqlite_error)?;
    let deleted = conn
        .execute("DELETE FROM repositories WHERE name = ?1", params![name])
        .map_err(sqlite_error)?;
    Ok(deleted == 1)
}

fn row_to_repository(row: &Row<'_>) -> rusqlite::Result<RepositoryMetadata> {
    let stats_raw: Option<String> = row.get(6)?;
    let file_count: i64 = row.get(7)?;
    Ok(RepositoryMetadata {
        name: row.get(0)?,
        url: row.get(1)?,
        default_branch: row.get(2)?,
        last_commit: row.get(3)?,
        last_synced_at: row.get(4)?,
        last_sync_status: row.get(5)?,
        last_sync_stats: stats_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        file_count: file_count.max(0) as u64,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}
