use serde::{Deserialize, Serialize};

/// Lifecycle state of a sync job.
///
/// Valid transitions are `pending -> running -> completed` and
/// `pending -> running -> failed`; nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sync job asks the worker to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Clone (or repair) the mirror and index every qualifying file.
    Import,
    /// Fetch and apply the changes between two revisions.
    Sync,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Sync => "sync",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "import" => Some(Self::Import),
            "sync" => Some(Self::Sync),
            _ => None,
        }
    }
}

/// Inbound trigger: one change notification or manual request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTrigger {
    /// Idempotency key. Derived from the other fields when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub repo: String,
    #[serde(default = "default_job_kind")]
    pub kind: JobKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub new_rev: Option<String>,
    #[serde(default)]
    pub old_rev: Option<String>,
    #[serde(default = "default_trigger_source")]
    pub trigger: String,
}

fn default_job_kind() -> JobKind {
    JobKind::Sync
}

fn default_trigger_source() -> String {
    "manual".to_string()
}

impl SyncTrigger {
    /// The idempotency id for this trigger.
    ///
    /// Explicit ids win; otherwise a blake3 digest of the fields that identify the
    /// event, so redelivery of the same event maps to the same job.
    pub fn job_id(&self) -> String {
        if let Some(id) = self.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        let mut hasher = blake3::Hasher::new();
        for part in [
            self.repo.as_str(),
            self.kind.as_str(),
            self.url.as_deref().unwrap_or(""),
            self.old_rev.as_deref().unwrap_or(""),
            self.new_rev.as_deref().unwrap_or(""),
            self.trigger.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        format!("{}-{}", self.kind.as_str(), &hasher.finalize().to_hex()[..24])
    }
}

/// A persisted synchronization attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub job_id: String,
    pub repo: String,
    pub kind: JobKind,
    pub url: Option<String>,
    pub old_rev: Option<String>,
    pub new_rev: Option<String>,
    pub trigger: String,
    pub status: JobStatus,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub expires_at: String,
}

/// Per-run counters for an import or delta sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub files_indexed: u64,
    pub files_removed: u64,
    pub files_renamed: u64,
    pub files_skipped: u64,
    pub errors: u64,
    pub duration_ms: u64,
}

/// Per-repository bookkeeping written by a completed import or sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub name: String,
    pub url: Option<String>,
    pub default_branch: Option<String>,
    pub last_commit: Option<String>,
    pub last_synced_at: Option<String>,
    pub last_sync_status: Option<String>,
    pub last_sync_stats: Option<SyncStats>,
    pub file_count: u64,
    pub created_at: String,
    pub updated_at: String,
}

/// Searchable metadata surrogate for one file. Never holds file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedFile {
    pub repo: String,
    pub path: String,
    pub filename: String,
    pub language: Option<String>,
    pub size_bytes: u64,
    pub line_count: u64,
    pub commit: Option<String>,
    pub imports: Vec<String>,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub search_text: String,
    pub indexed_at: String,
}
