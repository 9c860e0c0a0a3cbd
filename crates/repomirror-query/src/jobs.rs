use repomirror_core::config::QueueConfig;
use repomirror_core::error::QueryError;
use repomirror_core::types::{JobKind, JobStatus, SyncJob, SyncTrigger};
use repomirror_state::retry::{RetryConfig, with_retry};
use repomirror_state::sync_jobs::{self, EnqueueOutcome};
use repomirror_vcs::validate::{validate_ref, validate_repo_name, validate_url};
use rusqlite::Connection;
use serde::Serialize;

/// Public view of a sync job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub repo: String,
    pub kind: JobKind,
    pub trigger: String,
    pub old_rev: Option<String>,
    pub new_rev: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SyncJob> for JobStatusView {
    fn from(job: SyncJob) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            repo: job.repo,
            kind: job.kind,
            trigger: job.trigger,
            old_rev: job.old_rev,
            new_rev: job.new_rev,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            expires_at: job.expires_at,
            result: job.result,
            error: job.error,
        }
    }
}

/// Validate an inbound trigger and record it as a pending job.
///
/// Duplicate idempotency ids are absorbed by the existing job. A busy store is
/// retried with backoff before the error reaches the caller.
pub fn submit_trigger(
    conn: &Connection,
    trigger: &SyncTrigger,
    queue: &QueueConfig,
) -> Result<EnqueueOutcome, QueryError> {
    validate_repo_name(&trigger.repo)?;
    for rev in [&trigger.new_rev, &trigger.old_rev].into_iter().flatten() {
        validate_ref(rev)?;
    }
    match trigger.url.as_deref() {
        Some(url) => validate_url(url.trim())?,
        None if trigger.kind == JobKind::Import => {
            return Err(QueryError::invalid_input("url", "import triggers need a source url"));
        }
        None => {}
    }
    if trigger.trigger.trim().is_empty() {
        return Err(QueryError::invalid_input("trigger", "must not be empty"));
    }
    let retry = RetryConfig::from_queue_config(queue);
    Ok(with_retry(&retry, "enqueue", || {
        sync_jobs::enqueue(conn, trigger, queue.job_retention_hours)
    })?)
}

pub fn get_job_status(
    conn: &Connection,
    job_id: &str,
    queue: &QueueConfig,
) -> Result<JobStatusView, QueryError> {
    let job_id = job_id.trim();
    if job_id.is_empty() {
        return Err(QueryError::invalid_input("job_id", "must not be empty"));
    }
    let retry = RetryConfig::from_queue_config(queue);
    with_retry(&retry, "get_job", || sync_jobs::get_job(conn, job_id))?
        .map(JobStatusView::from)
        .ok_or_else(|| QueryError::JobNotFound {
            job_id: job_id.to_string(),
        })
}

pub fn list_job_status(
    conn: &Connection,
    repo: Option<&str>,
    status: Option<&str>,
    limit: usize,
    queue: &QueueConfig,
) -> Result<Vec<JobStatusView>, QueryError> {
    let status = match status.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(JobStatus::parse(raw).ok_or_else(|| {
            QueryError::invalid_input("status", format!("unknown job status '{raw}'"))
        })?),
        None => None,
    };
    let retry = RetryConfig::from_queue_config(queue);
    Ok(with_retry(&retry, "list_jobs", || sync_jobs::list_jobs(conn, repo, status, limit))?
        .into_iter()
        .map(JobStatusView::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repomirror_state::{db, schema};
    use tempfile::{TempDir, tempdir};

    fn setup_test_db() -> (TempDir, Connection) {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("state.db")).unwrap();
        schema::create_tables(&conn).unwrap();
        (dir, conn)
    }

    fn queue() -> QueueConfig {
        QueueConfig {
            store_initial_backoff_ms: 50,
            ..QueueConfig::default()
        }
    }

    fn trigger(id: &str) -> SyncTrigger {
        SyncTrigger {
            id: Some(id.to_string()),
            repo: "demo".into(),
            kind: JobKind::Sync,
            url: None,
            new_rev: Some("b".repeat(40)),
            old_rev: None,
            trigger: "webhook".into(),
        }
    }

    #[test]
    fn duplicate_triggers_collapse_into_one_job() {
        let (_dir, conn) = setup_test_db();
        let first = submit_trigger(&conn, &trigger("evt-1"), &queue()).unwrap();
        let second = submit_trigger(&conn, &trigger("evt-1"), &queue()).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.job_id, second.job_id);
        assert_eq!(list_job_status(&conn, None, None, 10, &queue()).unwrap().len(), 1);
    }

    #[test]
    fn malformed_triggers_are_rejected() {
        let (_dir, conn) = setup_test_db();
        let mut bad_name = trigger("evt-1");
        bad_name.repo = "../etc".into();
        let mut flag_rev = trigger("evt-2");
        flag_rev.new_rev = Some("--upload-pack=x".into());
        let mut import_without_url = trigger("evt-3");
        import_without_url.kind = JobKind::Import;
        let mut ext_url = trigger("evt-4");
        ext_url.url = Some("ext::sh -c touch% /tmp/pwned".into());

        for bad in [bad_name, flag_rev, import_without_url, ext_url] {
            let err = submit_trigger(&conn, &bad, &queue()).unwrap_err();
            assert_eq!(err.code().as_str(), "invalid_input", "{bad:?}");
        }
        assert!(list_job_status(&conn, None, None, 10, &queue()).unwrap().is_empty());
    }

    #[test]
    fn job_status_reflects_lifecycle() {
        let (_dir, conn) = setup_test_db();
        sync_jobs::enqueue(&conn, &trigger("evt-1"), 24).unwrap();
        let pending = get_job_status(&conn, "evt-1", &queue()).unwrap();
        assert_eq!(pending.status, JobStatus::Pending);
        assert!(pending.started_at.is_none());

        sync_jobs::claim_next(&conn).unwrap().unwrap();
        sync_jobs::fail_job(&conn, "evt-1", "auth_error: denied", 24).unwrap();
        let failed = get_job_status(&conn, "evt-1", &queue()).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("auth_error: denied"));
        assert!(failed.completed_at.is_some());

        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn unknown_job_and_bad_filters_map_to_codes() {
        let (_dir, conn) = setup_test_db();
        assert_eq!(
            get_job_status(&conn, "missing", &queue()).unwrap_err().code().as_str(),
            "job_not_found"
        );
        assert_eq!(
            get_job_status(&conn, " ", &queue()).unwrap_err().code().as_str(),
            "invalid_input"
        );
        assert_eq!(
            list_job_status(&conn, None, Some("queued"), 10, &queue())
                .unwrap_err()
                .code()
                .as_str(),
            "invalid_input"
        );
    }

    #[test]
    fn enqueue_waits_out_a_briefly_held_write_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        let holder = db::open_connection(&path).unwrap();
        schema::create_tables(&holder).unwrap();
        let conn = db::open_connection_with_config(&path, 1, -64000).unwrap();

        holder.execute_batch("BEGIN IMMEDIATE").unwrap();
        let release = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(150));
            holder.execute_batch("COMMIT").unwrap();
        });

        let queue = QueueConfig {
            store_max_retries: 6,
            store_initial_backoff_ms: 50,
            store_max_backoff_ms: 400,
            ..QueueConfig::default()
        };
        let outcome = submit_trigger(&conn, &trigger("evt-locked"), &queue).unwrap();
        release.join().unwrap();
        assert!(outcome.created);
        assert_eq!(
            get_job_status(&conn, "evt-locked", &queue).unwrap().status,
            JobStatus::Pending
        );
    }

    #[test]
    fn listing_filters_by_status() {
        let (_dir, conn) = setup_test_db();
        sync_jobs::enqueue(&conn, &trigger("evt-1"), 24).unwrap();
        sync_jobs::enqueue(&conn, &trigger("evt-2"), 24).unwrap();
        sync_jobs::claim_next(&conn).unwrap();
        let pending = list_job_status(&conn, Some("demo"), Some("pending"), 10, &queue()).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(list_job_status(&conn, None, None, 10, &queue()).unwrap().len(), 2);
    }
}
