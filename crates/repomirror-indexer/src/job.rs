use crate::import::initial_import;
use crate::record::IndexLimits;
use crate::sync_incremental::delta_sync;
use repomirror_core::error::{StateError, SyncError};
use repomirror_core::types::{JobKind, SyncJob};
use repomirror_state::repositories;
use repomirror_vcs::MirrorStore;
use rusqlite::Connection;
use tracing::info;

/// Run one claimed job to completion and return its result payload.
///
/// A `sync` job for a repository with no recorded revision turns into an
/// import when the job carries a source url.
pub fn execute_job(
    conn: &mut Connection,
    store: &MirrorStore,
    limits: &IndexLimits,
    job: &SyncJob,
) -> Result<serde_json::Value, SyncError> {
    let url = job.url.as_deref().map(str::trim).filter(|url| !url.is_empty());
    match job.kind {
        JobKind::Import => {
            let url = url.ok_or_else(|| SyncError::MissingUrl {
                repo: job.repo.clone(),
            })?;
            let outcome = initial_import(conn, store, limits, url, &job.repo)?;
            to_payload(&outcome)
        }
        JobKind::Sync => {
            let has_previous = job.old_rev.is_some()
                || repositories::last_commit(conn, &job.repo)?.is_some();
            if !has_previous && let Some(url) = url {
                info!(job_id = %job.job_id, repo = %job.repo, "No previous revision; running initial import");
                let outcome = initial_import(conn, store, limits, url, &job.repo)?;
                return to_payload(&outcome);
            }
            let new_rev = job.new_rev.as_deref().unwrap_or("HEAD");
            let outcome = delta_sync(conn, store, limits, &job.repo, new_rev, job.old_rev.as_deref())?;
            to_payload(&outcome)
        }
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, SyncError> {
    serde_json::to_value(value).map_err(|e| StateError::serialization(e).into())
}
