use thiserror::Error;

/// Stable error codes surfaced by the query interfaces (CLI and HTTP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidInput,
    RepoNotFound,
    JobNotFound,
    NotIndexed,
    VcsError,
    InternalError,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::RepoNotFound => "repo_not_found",
            Self::JobNotFound => "job_not_found",
            Self::NotIndexed => "not_indexed",
            Self::VcsError => "vcs_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("sqlite error: {0}")]
    Sqlite(String),

    /// Lock contention or a dropped handle; safe to retry.
    #[error("store busy: {0}")]
    Busy(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid job transition: job_id={job_id}, from={from}, to={to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StateError {
    /// Convenience constructor for SQLite errors, used as `.map_err(StateError::sqlite)`.
    pub fn sqlite<E: std::fmt::Display>(e: E) -> Self {
        Self::Sqlite(e.to_string())
    }

    pub fn busy<E: std::fmt::Display>(e: E) -> Self {
        Self::Busy(e.to_string())
    }

    /// Convenience constructor for JSON column errors.
    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }

    pub fn invalid_transition(
        job_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            job_id: job_id.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Whether the failure is a transient backing-store condition worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// Category of a failed git invocation, derived from its sanitized stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitFailureKind {
    Network,
    Auth,
    RepoNotFound,
    Permission,
    Unknown,
}

impl GitFailureKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network_error",
            Self::Auth => "auth_error",
            Self::RepoNotFound => "repo_not_found",
            Self::Permission => "permission_error",
            Self::Unknown => "unknown_error",
        }
    }

    /// Only network failures are worth retrying.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network)
    }
}

impl std::fmt::Display for GitFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("mirror root not configured or missing: {path}")]
    MirrorRootMissing { path: String },

    #[error("mirror not found: {name}")]
    MirrorNotFound { name: String },

    #[error("refusing to delete {path}: {reason}")]
    UnsafeDeletion { path: String, reason: String },

    #[error("git command timed out after {timeout_ms}ms: {command}")]
    Timeout { command: String, timeout_ms: u128 },

    #[error("git command failed ({kind}, exit {code:?}): {command}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        kind: GitFailureKind,
        stderr: String,
    },

    #[error("failed to spawn git: {0}")]
    Spawn(String),

    #[error("unexpected git output: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Failure category, if this error came from a git invocation.
    pub fn failure_kind(&self) -> Option<GitFailureKind> {
        match self {
            Self::CommandFailed { kind, .. } => Some(*kind),
            Self::Timeout { .. } => Some(GitFailureKind::Network),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.failure_kind().is_some_and(GitFailureKind::is_retryable)
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("repository not imported: {repo}")]
    RepoNotImported { repo: String },

    #[error("no previous revision recorded for {repo}; run an initial import first")]
    NoPreviousRevision { repo: String },

    #[error("could not list files for {repo} at any of: {tried}")]
    FileListingUnavailable { repo: String, tried: String },

    #[error("could not resolve a revision id for {repo}")]
    RevisionUnresolved { repo: String },

    #[error("no source url recorded for {repo}")]
    MissingUrl { repo: String },

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl SyncError {
    /// Stable label recorded on failed jobs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::RepoNotImported { .. }
            | Self::NoPreviousRevision { .. }
            | Self::MissingUrl { .. } => "configuration_error",
            Self::FileListingUnavailable { .. } | Self::RevisionUnresolved { .. } => {
                "revision_error"
            }
            Self::Vcs(err) => err.failure_kind().map_or("vcs_error", GitFailureKind::as_str),
            Self::State(_) => "store_error",
        }
    }
}

/// Failures of the query surface. Every variant maps to a stable [`ErrorCode`].
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("repository not found: {repo}")]
    RepoNotFound { repo: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("repository {repo} has no indexed files")]
    NotIndexed { repo: String },

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl QueryError {
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput { .. } | Self::Vcs(VcsError::InvalidInput { .. }) => {
                ErrorCode::InvalidInput
            }
            Self::RepoNotFound { .. } | Self::Vcs(VcsError::MirrorNotFound { .. }) => {
                ErrorCode::RepoNotFound
            }
            Self::JobNotFound { .. } => ErrorCode::JobNotFound,
            Self::NotIndexed { .. } => ErrorCode::NotIndexed,
            Self::Vcs(_) => ErrorCode::VcsError,
            Self::State(_) => ErrorCode::InternalError,
        }
    }
}
