use crate::refs::{open_mirror, repository};
use repomirror_core::error::QueryError;
use repomirror_state::files;
use repomirror_vcs::MirrorStore;
use rusqlite::Connection;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageCount {
    pub language: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepoStats {
    pub repo: String,
    pub file_count: u64,
    /// Commits reachable from the indexed revision; `None` if it could not be counted.
    pub commit_count: Option<u64>,
    /// Bytes on disk used by the mirror.
    pub size_bytes: u64,
    pub languages: Vec<LanguageCount>,
    pub default_branch: Option<String>,
    pub last_commit: Option<String>,
    pub last_synced_at: Option<String>,
    pub last_sync_status: Option<String>,
}

pub fn get_repo_stats(
    conn: &Connection,
    store: &MirrorStore,
    repo: &str,
) -> Result<RepoStats, QueryError> {
    let metadata = repository(conn, repo)?.ok_or_else(|| QueryError::RepoNotFound {
        repo: repo.to_string(),
    })?;
    let mirror = open_mirror(store, repo)?;

    let reference = metadata
        .last_commit
        .clone()
        .or_else(|| metadata.default_branch.clone())
        .unwrap_or_else(|| "HEAD".to_string());
    let commit_count = match mirror.commit_count(&reference) {
        Ok(count) => Some(count),
        Err(err) => {
            warn!(repo, reference = %reference, error = %err, "Commit count unavailable");
            None
        }
    };

    let languages = files::language_histogram(conn, repo)?
        .into_iter()
        .map(|(language, count)| LanguageCount { language, count })
        .collect();

    Ok(RepoStats {
        repo: repo.to_string(),
        file_count: files::count_files(conn, repo)?,
        commit_count,
        size_bytes: mirror.disk_size(),
        languages,
        default_branch: metadata.default_branch,
        last_commit: metadata.last_commit,
        last_synced_at: metadata.last_synced_at,
        last_sync_status: metadata.last_sync_status,
    })
}
