use crate::filter::should_index;
use crate::reader::{READ_BATCH_SIZE, read_batch};
use crate::record::IndexLimits;
use crate::writer::{IndexOutcome, index_file};
use repomirror_core::error::{SyncError, VcsError};
use repomirror_core::types::SyncStats;
use repomirror_state::db::sqlite_error;
use repomirror_state::{files, repositories};
use repomirror_vcs::{Mirror, MirrorStore};
use rusqlite::Connection;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

pub const STATUS_IMPORTED: &str = "imported";

#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub repo: String,
    pub commit: String,
    pub default_branch: Option<String>,
    pub mirror_created: bool,
    pub stats: SyncStats,
}

/// Mirror `url` as `name` and index every qualifying file at its default branch.
///
/// Each batch of reads is written in its own short transaction. Records left
/// over from an earlier import at another revision are dropped at the end.
pub fn initial_import(
    conn: &mut Connection,
    store: &MirrorStore,
    limits: &IndexLimits,
    url: &str,
    name: &str,
) -> Result<ImportOutcome, SyncError> {
    let started = Instant::now();
    let outcome = store.create_or_repair(url, name)?;
    let mirror = outcome.mirror;

    let default_branch = mirror.default_branch()?;
    let (listed_at, all_files) = list_files_with_fallback(&mirror, default_branch.as_deref())?;
    let commit = mirror
        .resolve_revision(listed_at)?
        .ok_or_else(|| SyncError::RevisionUnresolved {
            repo: name.to_string(),
        })?;

    let total = all_files.len();
    let qualifying: Vec<String> = all_files.into_iter().filter(|path| should_index(path)).collect();
    let mut stats = SyncStats {
        files_skipped: (total - qualifying.len()) as u64,
        ..SyncStats::default()
    };
    info!(
        repo = name,
        branch = ?default_branch,
        commit = %commit,
        total_files = total,
        qualifying = qualifying.len(),
        "Starting initial import"
    );

    for batch in qualifying.chunks(READ_BATCH_SIZE) {
        let contents = read_batch(&mirror, batch, &commit);
        let tx = conn.transaction().map_err(sqlite_error)?;
        for (path, content) in contents {
            let Some(content) = content else {
                warn!(repo = name, path = %path, "Unreadable file; counted as error");
                stats.errors += 1;
                continue;
            };
            match index_file(&tx, name, &path, &content, Some(&commit), limits)? {
                IndexOutcome::Indexed => stats.files_indexed += 1,
                IndexOutcome::SkippedTooLarge => stats.files_skipped += 1,
            }
        }
        tx.commit().map_err(sqlite_error)?;
    }

    let tx = conn.transaction().map_err(sqlite_error)?;
    stats.files_removed = files::delete_not_at_commit(&tx, name, &commit)? as u64;
    stats.duration_ms = started.elapsed().as_millis() as u64;
    repositories::record_sync(
        &tx,
        &repositories::SyncRecord {
            name,
            url: Some(url.trim()),
            default_branch: default_branch.as_deref(),
            commit: &commit,
            status: STATUS_IMPORTED,
            stats: &stats,
        },
    )?;
    tx.commit().map_err(sqlite_error)?;

    info!(
        repo = name,
        files_indexed = stats.files_indexed,
        files_skipped = stats.files_skipped,
        errors = stats.errors,
        duration_ms = stats.duration_ms,
        "Initial import complete"
    );
    Ok(ImportOutcome {
        repo: name.to_string(),
        commit,
        default_branch,
        mirror_created: outcome.created,
        stats,
    })
}

/// List files at the default branch, then at `HEAD`. Returns the ref that worked.
fn list_files_with_fallback<'a>(
    mirror: &Mirror,
    default_branch: Option<&'a str>,
) -> Result<(&'a str, Vec<String>), SyncError> {
    let candidates: Vec<&'a str> = default_branch
        .into_iter()
        .chain(std::iter::once("HEAD"))
        .collect();
    let mut last_error: Option<VcsError> = None;
    for &candidate in &candidates {
        match mirror.list_files(candidate) {
            Ok(files) => return Ok((candidate, files)),
            Err(err) => {
                warn!(repo = mirror.name(), reference = candidate, error = %err, "File listing failed");
                last_error = Some(err);
            }
        }
    }
    if let Some(err @ VcsError::Timeout { .. }) = last_error {
        return Err(err.into());
    }
    Err(SyncError::FileListingUnavailable {
        repo: mirror.name().to_string(),
        tried: candidates.join(", "),
    })
}
