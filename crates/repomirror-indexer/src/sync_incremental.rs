use crate::filter::should_index;
use crate::reader::{READ_BATCH_SIZE, read_batch};
use crate::record::IndexLimits;
use crate::writer::{IndexOutcome, index_file, remove_files};
use repomirror_core::error::SyncError;
use repomirror_core::types::SyncStats;
use repomirror_state::db::sqlite_error;
use repomirror_state::repositories;
use repomirror_vcs::MirrorStore;
use rusqlite::Connection;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const STATUS_SYNCED: &str = "synced";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeltaOutcome {
    /// Old and new revision are the same; nothing was touched.
    UpToDate { repo: String, commit: String },
    Synced {
        repo: String,
        old_rev: String,
        new_rev: String,
        stats: SyncStats,
    },
}

/// Apply the changes between `old_rev` and `new_rev` to the mirror and the index.
///
/// `old_rev` defaults to the last revision recorded for the repository. A
/// repository that was never imported has no delta to apply.
pub fn delta_sync(
    conn: &mut Connection,
    store: &MirrorStore,
    limits: &IndexLimits,
    name: &str,
    new_rev: &str,
    old_rev: Option<&str>,
) -> Result<DeltaOutcome, SyncError> {
    let started = Instant::now();
    let metadata = repositories::get_repository(conn, name)?.ok_or_else(|| {
        SyncError::RepoNotImported {
            repo: name.to_string(),
        }
    })?;
    let old_rev = old_rev
        .map(str::trim)
        .filter(|rev| !rev.is_empty())
        .map(str::to_string)
        .or(metadata.last_commit)
        .ok_or_else(|| SyncError::NoPreviousRevision {
            repo: name.to_string(),
        })?;
    let new_rev = new_rev.trim();

    if old_rev == new_rev {
        debug!(repo = name, commit = %old_rev, "Already up to date");
        return Ok(DeltaOutcome::UpToDate {
            repo: name.to_string(),
            commit: old_rev,
        });
    }

    let mirror = store.fetch(name)?;
    let new_commit = mirror
        .resolve_revision(new_rev)?
        .ok_or_else(|| SyncError::RevisionUnresolved {
            repo: name.to_string(),
        })?;
    if new_commit == old_rev {
        debug!(repo = name, commit = %new_commit, "Already up to date after resolving");
        return Ok(DeltaOutcome::UpToDate {
            repo: name.to_string(),
            commit: new_commit,
        });
    }

    let changes = mirror.changed_files(&old_rev, &new_commit)?;
    info!(
        repo = name,
        old_rev = %old_rev,
        new_rev = %new_commit,
        added = changes.added.len(),
        modified = changes.modified.len(),
        removed = changes.removed.len(),
        renamed = changes.renamed.len(),
        "Applying delta"
    );

    let mut stats = SyncStats::default();
    let mut to_index: Vec<String> = Vec::with_capacity(changes.len());
    {
        let tx = conn.transaction().map_err(sqlite_error)?;
        stats.files_removed = remove_files(&tx, name, &changes.removed)? as u64;
        for rename in &changes.renamed {
            remove_files(&tx, name, std::slice::from_ref(&rename.old_path))?;
            stats.files_renamed += 1;
            to_index.push(rename.new_path.clone());
        }
        tx.commit().map_err(sqlite_error)?;
    }
    to_index.extend(changes.added.iter().cloned());
    to_index.extend(changes.modified.iter().cloned());

    let (qualifying, excluded): (Vec<String>, Vec<String>) =
        to_index.into_iter().partition(|path| should_index(path));
    stats.files_skipped = excluded.len() as u64;

    for batch in qualifying.chunks(READ_BATCH_SIZE) {
        let contents = read_batch(&mirror, batch, &new_commit);
        let tx = conn.transaction().map_err(sqlite_error)?;
        for (path, content) in contents {
            let Some(content) = content else {
                warn!(repo = name, path = %path, "Unreadable file; counted as error");
                stats.errors += 1;
                continue;
            };
            match index_file(&tx, name, &path, &content, Some(&new_commit), limits)? {
                IndexOutcome::Indexed => stats.files_indexed += 1,
                IndexOutcome::SkippedTooLarge => stats.files_skipped += 1,
            }
        }
        tx.commit().map_err(sqlite_error)?;
    }

    stats.duration_ms = started.elapsed().as_millis() as u64;
    repositories::record_sync(
        conn,
        &repositories::SyncRecord {
            name,
            url: None,
            default_branch: None,
            commit: &new_commit,
            status: STATUS_SYNCED,
            stats: &stats,
        },
    )?;

    info!(
        repo = name,
        new_rev = %new_commit,
        files_indexed = stats.files_indexed,
        files_removed = stats.files_removed,
        files_renamed = stats.files_renamed,
        errors = stats.errors,
        duration_ms = stats.duration_ms,
        "Delta sync complete"
    );
    Ok(DeltaOutcome::Synced {
        repo: name.to_string(),
        old_rev,
        new_rev: new_commit,
        stats,
    })
}
