use repomirror_core::error::StateError;
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use tracing::debug;

/// Open a SQLite connection with default pragmas.
pub fn open_connection(db_path: &Path) -> Result<Connection, StateError> {
    open_connection_with_config(db_path, 5000, -64000)
}

/// Open a SQLite connection with configurable pragmas.
pub fn open_connection_with_config(
    db_path: &Path,
    busy_timeout_ms: u32,
    cache_size: i32,
) -> Result<Connection, StateError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(StateError::Io)?;
    }

    let conn = Connection::open(db_path).map_err(sqlite_error)?;

    apply_pragmas(&conn, busy_timeout_ms, cache_size)?;

    debug!(?db_path, "SQLite connection opened");
    Ok(conn)
}

fn apply_pragmas(
    conn: &Connection,
    busy_timeout_ms: u32,
    cache_size: i32,
) -> Result<(), StateError> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {};
         PRAGMA cache_size = {};",
        busy_timeout_ms, cache_size
    ))
    .map_err(sqlite_error)?;
    Ok(())
}

/// Map a rusqlite error, separating lock contention (retryable) from everything else.
pub fn sqlite_error(err: rusqlite::Error) -> StateError {
    match &err {
        rusqlite::Error::SqliteFailure(inner, _)
            if matches!(
                inner.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            StateError::busy(err)
        }
        _ => StateError::sqlite(err),
    }
}

/// Run SQLite quick_check to verify database integrity.
/// Returns Ok(true) if healthy, Ok(false) with error detail otherwise.
pub fn check_sqlite_health(conn: &Connection) -> Result<(bool, Option<String>), StateError> {
    let result: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(sqlite_error)?;

    if result == "ok" {
        Ok((true, None))
    } else {
        Ok((false, Some(result)))
    }
}
