use crate::db::sqlite_error;
use repomirror_core::constants::SCHEMA_VERSION;
use repomirror_core::error::StateError;
use rusqlite::Connection;
use tracing::{debug, info};

/// Create all required SQLite tables and run any pending migrations.
///
/// Safe to call from every process on startup; all DDL is idempotent.
pub fn create_tables(conn: &Connection) -> Result<(), StateError> {
    conn.execute_batch(SCHEMA_SQL).map_err(sqlite_error)?;
    migrate(conn)?;
    debug!(version = SCHEMA_VERSION, "SQLite schema ready");
    Ok(())
}

/// Run incremental schema migrations up to `SCHEMA_VERSION`.
pub fn migrate(conn: &Connection) -> Result<(), StateError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(sqlite_error)?;

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(sqlite_error)?;

    type MigrationFn = fn(&Connection) -> Result<(), StateError>;

    let migrations: &[MigrationFn] = &[
        // V1: baseline, created by SCHEMA_SQL.
        |_conn| Ok(()),
        // V2: running jobs record a heartbeat while their worker is alive.
        |conn| add_column_if_missing(conn, "sync_jobs", "heartbeat_at", "TEXT"),
    ];

    for version in (current + 1)..=SCHEMA_VERSION {
        let idx = (version - 1) as usize;
        if idx < migrations.len() {
            migrations[idx](conn)?;
        }
        // Another process may have recorded the same version concurrently.
        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(sqlite_error)?;
        info!(version, "Applied schema migration");
    }

    Ok(())
}

/// `ALTER TABLE ... ADD COLUMN` that tolerates a concurrent process getting there first.
fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<(), StateError> {
    let exists: bool = conn
        .query_row(
            &format!("SELECT COUNT(*) > 0 FROM pragma_table_info('{table}') WHERE name = ?1"),
            [column],
            |row| row.get(0),
        )
        .map_err(sqlite_error)?;
    if !exists {
        conn.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
            .map_err(sqlite_error)?;
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS repositories (
    name TEXT PRIMARY KEY,
    url TEXT,
    default_branch TEXT,
    last_commit TEXT,
    last_synced_at TEXT,
    last_sync_status TEXT,
    last_sync_stats TEXT,
    file_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS indexed_files (
    repo TEXT NOT NULL,
    path TEXT NOT NULL,
    filename TEXT NOT NULL,
    language TEXT,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    line_count INTEGER NOT NULL DEFAULT 0,
    "commit" TEXT,
    imports TEXT NOT NULL DEFAULT '[]',
    functions TEXT NOT NULL DEFAULT '[]',
    classes TEXT NOT NULL DEFAULT '[]',
    search_text TEXT NOT NULL DEFAULT '',
    indexed_at TEXT NOT NULL,
    PRIMARY KEY (repo, path)
);

CREATE INDEX IF NOT EXISTS idx_indexed_files_repo_filename
    ON indexed_files(repo, filename);
CREATE INDEX IF NOT EXISTS idx_indexed_files_repo_language
    ON indexed_files(repo, language);

CREATE TABLE IF NOT EXISTS sync_jobs (
    job_id TEXT PRIMARY KEY,
    repo TEXT NOT NULL,
    kind TEXT NOT NULL,
    url TEXT,
    old_rev TEXT,
    new_rev TEXT,
    "trigger" TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending'
        CHECK (status IN ('pending', 'running', 'completed', 'failed')),
    created_at TEXT NOT NULL,
    started_at TEXT,
    completed_at TEXT,
    result TEXT,
    error TEXT,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_jobs_status_created
    ON sync_jobs(status, created_at);
CREATE INDEX IF NOT EXISTS idx_sync_jobs_repo_created
    ON sync_jobs(repo, created_at);
CREATE INDEX IF NOT EXISTS idx_sync_jobs_expires
    ON sync_jobs(expires_at);
"#;
