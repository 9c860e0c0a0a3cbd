pub mod jobs;
pub mod repo;
pub mod search;
pub mod serve;
pub mod sync;

use anyhow::{Context, Result};
use repomirror_core::config::Config;
use repomirror_state::{db, schema};
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

/// Open the shared state database, creating it and its tables on first use.
pub fn open_state(config: &Config) -> Result<Connection> {
    let db_path = config.db_path();
    let conn = db::open_connection_with_config(
        &db_path,
        config.storage.busy_timeout_ms,
        config.storage.cache_size,
    )
    .with_context(|| format!("Failed to open state database {}", db_path.display()))?;
    schema::create_tables(&conn)?;
    debug!(db = %db_path.display(), "State database ready");
    Ok(conn)
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
