use crate::refs::{open_mirror, repository};
use repomirror_core::constants::DEFAULT_COMMIT_FILES_LIMIT;
use repomirror_core::error::QueryError;
use repomirror_vcs::MirrorStore;
use repomirror_vcs::commit::CommitInfo;
use rusqlite::Connection;

/// Metadata and one page of changed files for the tip of `reference`.
///
/// Without an explicit ref the recorded default branch is used, then the
/// mirror's `HEAD`.
pub fn last_commit_info(
    conn: &Connection,
    store: &MirrorStore,
    repo: &str,
    reference: Option<&str>,
    offset: usize,
    limit: Option<usize>,
    max_limit: usize,
) -> Result<CommitInfo, QueryError> {
    let mirror = open_mirror(store, repo)?;
    let reference = match reference.map(str::trim).filter(|r| !r.is_empty()) {
        Some(explicit) => explicit.to_string(),
        None => repository(conn, repo)?
            .and_then(|metadata| metadata.default_branch)
            .unwrap_or_else(|| "HEAD".to_string()),
    };
    let limit = limit
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_COMMIT_FILES_LIMIT)
        .min(max_limit.max(1));
    Ok(mirror.commit_info(&reference, offset, limit)?)
}
