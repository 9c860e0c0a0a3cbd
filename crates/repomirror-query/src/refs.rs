use repomirror_core::error::{QueryError, VcsError};
use repomirror_core::types::RepositoryMetadata;
use repomirror_state::repositories;
use repomirror_vcs::{Mirror, MirrorStore};
use rusqlite::Connection;
use serde::Serialize;

/// Where the revision a query ran against came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefSource {
    Requested,
    IndexedCommit,
    DefaultBranch,
    MirrorHead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveRef {
    pub reference: String,
    pub source: RefSource,
}

/// Open the mirror for `repo`, reporting a missing mirror as an unknown repository.
pub fn open_mirror(store: &MirrorStore, repo: &str) -> Result<Mirror, QueryError> {
    store.open(repo).map_err(|err| match err {
        VcsError::MirrorNotFound { .. } | VcsError::MirrorRootMissing { .. } => {
            QueryError::RepoNotFound {
                repo: repo.to_string(),
            }
        }
        other => other.into(),
    })
}

pub fn repository(conn: &Connection, repo: &str) -> Result<Option<RepositoryMetadata>, QueryError> {
    Ok(repositories::get_repository(conn, repo)?)
}

/// Pick the revision to query: an explicit request, else the last indexed
/// commit, else the recorded default branch, else whatever the mirror resolves.
pub fn effective_ref(
    metadata: Option<&RepositoryMetadata>,
    mirror: &Mirror,
    requested: Option<&str>,
) -> Result<EffectiveRef, QueryError> {
    if let Some(reference) = requested.map(str::trim).filter(|r| !r.is_empty()) {
        return Ok(EffectiveRef {
            reference: reference.to_string(),
            source: RefSource::Requested,
        });
    }
    if let Some(commit) = metadata.and_then(|m| m.last_commit.clone()) {
        return Ok(EffectiveRef {
            reference: commit,
            source: RefSource::IndexedCommit,
        });
    }
    if let Some(branch) = metadata.and_then(|m| m.default_branch.clone()) {
        return Ok(EffectiveRef {
            reference: branch,
            source: RefSource::DefaultBranch,
        });
    }
    let reference = match mirror.default_branch()? {
        Some(branch) => branch,
        None => "HEAD".to_string(),
    };
    Ok(EffectiveRef {
        reference,
        source: RefSource::MirrorHead,
    })
}
