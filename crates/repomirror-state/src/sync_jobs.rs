//! Persistent sync job queue.
//!
//! Every worker process shares this table. The only way a job leaves `pending`
//! is [`claim_next`], a single conditional `UPDATE ... RETURNING`, so two
//! claimers can never both observe the same job as theirs.

use crate::db::sqlite_error;
use repomirror_core::error::StateError;
use repomirror_core::types::{JobKind, JobStatus, SyncJob, SyncTrigger};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const STATUS_PENDING: &str = "pending";
const STATUS_RUNNING: &str = "running";
const STATUS_COMPLETED: &str = "completed";
const STATUS_FAILED: &str = "failed";
const ERROR_WORKER_LOST: &str = "worker_lost: job exceeded the running window without a terminal status";

const JOB_COLUMNS: &str = "job_id, repo, kind, url, old_rev, new_rev, \"trigger\", status,
     created_at, started_at, completed_at, result, error, expires_at";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOutcome {
    pub job_id: String,
    /// False when an existing job with the same idempotency id absorbed the trigger.
    pub created: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
}

/// Record a trigger as a pending job, keyed by its idempotency id.
///
/// Redundant deliveries of the same event are absorbed: the existing row is left
/// untouched, whatever its status.
pub fn enqueue(
    conn: &Connection,
    trigger: &SyncTrigger,
    retention_hours: u32,
) -> Result<EnqueueOutcome, StateError> {
    let job_id = trigger.job_id();
    let inserted = conn
        .execute(
            "INSERT INTO sync_jobs (
                 job_id, repo, kind, url, old_rev, new_rev, \"trigger\", status,
                 created_at, started_at, completed_at, result, error, expires_at
             ) VALUES (
                 ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                 strftime('%Y-%m-%dT%H:%M:%SZ', 'now'), NULL, NULL, NULL, NULL,
                 strftime('%Y-%m-%dT%H:%M:%SZ', 'now', printf('+%d hours', ?9))
             )
             ON CONFLICT(job_id) DO NOTHING",
            params![
                job_id,
                trigger.repo,
                trigger.kind.as_str(),
                trigger.url,
                trigger.old_rev,
                trigger.new_rev,
                trigger.trigger,
                STATUS_PENDING,
                retention_hours.max(1),
            ],
        )
        .map_err(sqlite_error)?;

    let created = inserted == 1;
    if created {
        info!(job_id, repo = %trigger.repo, kind = trigger.kind.as_str(), trigger = %trigger.trigger, "Sync job enqueued");
    } else {
        debug!(job_id, repo = %trigger.repo, "Duplicate trigger absorbed by existing job");
    }
    Ok(EnqueueOutcome { job_id, created })
}

/// Atomically claim the oldest pending job, flipping it to `running`.
///
/// Returns `None` when nothing is pending or another claimer won the race.
pub fn claim_next(conn: &Connection) -> Result<Option<SyncJob>, StateError> {
    let sql = format!(
        "WITH candidate AS (
             SELECT job_id
             FROM sync_jobs
             WHERE status = ?1
             ORDER BY created_at ASC, rowid ASC
             LIMIT 1
         )
         UPDATE sync_jobs
         SET status = ?2,
             started_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
         WHERE job_id IN (SELECT job_id FROM candidate)
           AND status = ?1
         RETURNING {JOB_COLUMNS}"
    );
    let job = conn
        .query_row(&sql, params![STATUS_PENDING, STATUS_RUNNING], row_to_job)
        .optional()
        .map_err(sqlite_error)?;

    if let Some(job) = &job {
        info!(job_id = %job.job_id, repo = %job.repo, kind = job.kind.as_str(), "Sync job claimed");
    }
    Ok(job)
}

/// Move a running job to `completed` with its result payload.
pub fn complete_job(
    conn: &Connection,
    job_id: &str,
    result: &serde_json::Value,
    retention_hours: u32,
) -> Result<(), StateError> {
    let payload = serde_json::to_string(result).map_err(StateError::serialization)?;
    finish_job(
        conn,
        job_id,
        JobStatus::Completed,
        Some(payload),
        None,
        retention_hours,
    )
}

/// Move a running job to `failed` with an error description.
pub fn fail_job(
    conn: &Connection,
    job_id: &str,
    error: &str,
    retention_hours: u32,
) -> Result<(), StateError> {
    finish_job(
        conn,
        job_id,
        JobStatus::Failed,
        None,
        Some(error.to_string()),
        retention_hours,
    )
}

fn finish_job(
    conn: &Connection,
    job_id: &str,
    status: JobStatus,
    result: Option<String>,
    error: Option<String>,
    retention_hours: u32,
) -> Result<(), StateError> {
    let updated = conn
        .execute(
            "UPDATE sync_jobs
             SET status = ?1,
                 completed_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now'),
                 result = ?2,
                 error = ?3,
                 expires_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now', printf('+%d hours', ?4))
             WHERE job_id = ?5
               AND status = ?6",
            params![
                status.as_str(),
                result,
                error,
                retention_hours.max(1),
                job_id,
                STATUS_RUNNING
            ],
        )
        .map_err(sqlite_error)?;

    if updated == 1 {
        return Ok(());
    }

    let current = get_job(conn, job_id)?
        .map(|job| job.status.as_str().to_string())
        .unwrap_or_else(|| "missing".to_string());
    Err(StateError::invalid_transition(
        job_id,
        current,
        status.as_str(),
    ))
}

/// Refresh the heartbeat of a running job. Returns false once the job is no
/// longer running.
pub fn heartbeat(conn: &Connection, job_id: &str) -> Result<bool, StateError> {
    let updated = conn
        .execute(
            "UPDATE sync_jobs
             SET heartbeat_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE job_id = ?1
               AND status = ?2",
            params![job_id, STATUS_RUNNING],
        )
        .map_err(sqlite_error)?;
    Ok(updated == 1)
}

/// Look up a job by id.
pub fn get_job(conn: &Connection, job_id: &str) -> Result<Option<SyncJob>, StateError> {
    conn.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE job_id = ?1"),
        params![job_id],
        row_to_job,
    )
    .optional()
    .map_err(sqlite_error)
}

/// Most recent jobs first, optionally filtered by repository and status.
pub fn list_jobs(
    conn: &Connection,
    repo: Option<&str>,
    status: Option<JobStatus>,
    limit: usize,
) -> Result<Vec<SyncJob>, StateError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {JOB_COLUMNS}
             FROM sync_jobs
             WHERE (?1 IS NULL OR repo = ?1)
               AND (?2 IS NULL OR status = ?2)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3"
        ))
        .map_err(sqlite_error)?;
    let rows = stmt
        .query_map(
            params![repo, status.map(|s| s.as_str()), limit.max(1) as i64],
            row_to_job,
        )
        .map_err(sqlite_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sqlite_error)
}

/// Number of jobs per status.
pub fn count_by_status(conn: &Connection) -> Result<JobCounts, StateError> {
    let mut stmt = conn
        .prepare("SELECT status, COUNT(*) FROM sync_jobs GROUP BY status")
        .map_err(sqlite_error)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(sqlite_error)?;

    let mut counts = JobCounts::default();
    for row in rows {
        let (status, count) = row.map_err(sqlite_error)?;
        let count = count.max(0) as u64;
        match JobStatus::parse(&status) {
            Some(JobStatus::Pending) => counts.pending = count,
            Some(JobStatus::Running) => counts.running = count,
            Some(JobStatus::Completed) => counts.completed = count,
            Some(JobStatus::Failed) => counts.failed = count,
            None => {}
        }
    }
    Ok(counts)
}

/// Delete expired jobs. Running jobs are never touched.
pub fn cleanup_expired(conn: &Connection, batch_limit: usize) -> Result<usize, StateError> {
    let deleted = conn
        .execute(
            "DELETE FROM sync_jobs
             WHERE rowid IN (
               SELECT rowid
               FROM sync_jobs
               WHERE status IN (?1, ?2, ?3)
                 AND expires_at < strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
               ORDER BY expires_at ASC
               LIMIT ?4
             )",
            params![
                STATUS_PENDING,
                STATUS_COMPLETED,
                STATUS_FAILED,
                batch_limit.max(1) as i64
            ],
        )
        .map_err(sqlite_error)?;
    if deleted > 0 {
        info!(deleted, "Expired sync jobs removed");
    }
    Ok(deleted)
}

/// Fail `running` jobs whose last heartbeat (or start, before the first one) is
/// older than `older_than_minutes`.
///
/// A process that died mid-job leaves its row running forever; this writes the
/// terminal status it never got to. A live worker keeps beating, so a long job
/// is never failed under it.
pub fn fail_stale_running(
    conn: &Connection,
    older_than_minutes: u32,
    retention_hours: u32,
) -> Result<usize, StateError> {
    let updated = conn
        .execute(
            "UPDATE sync_jobs
             SET status = ?1,
                 completed_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now'),
                 error = ?2,
                 expires_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now', printf('+%d hours', ?3))
             WHERE status = ?4
               AND COALESCE(heartbeat_at, started_at)
                   < strftime('%Y-%m-%dT%H:%M:%SZ', 'now', printf('-%d minutes', ?5))",
            params![
                STATUS_FAILED,
                ERROR_WORKER_LOST,
                retention_hours.max(1),
                STATUS_RUNNING,
                older_than_minutes.max(1)
            ],
        )
        .map_err(sqlite_error)?;
    if updated > 0 {
        warn!(updated, older_than_minutes, "Stale running jobs marked failed");
    }
    Ok(updated)
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<SyncJob> {
    let kind_raw: String = row.get(2)?;
    let status_raw: String = row.get(7)?;
    let result_raw: Option<String> = row.get(11)?;
    Ok(SyncJob {
        job_id: row.get(0)?,
        repo: row.get(1)?,
        kind: JobKind::parse(&kind_raw).ok_or_else(|| invalid_column(2, &kind_raw))?,
        url: row.get(3)?,
        old_rev: row.get(4)?,
        new_rev: row.get(5)?,
        trigger: row.get(6)?,
        status: JobStatus::parse(&status_raw).ok_or_else(|| invalid_column(7, &status_raw))?,
        created_at: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
        result: result_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        error: row.get(12)?,
        expires_at: row.get(13)?,
    })
}

fn invalid_column(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unexpected value: {raw}").into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, schema};
    use std::path::Path;
    use std::sync::{Arc, Barrier};
    use tempfile::{TempDir, tempdir};

    fn setup_test_db() -> (TempDir, Connection) {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("state.db")).unwrap();
        schema::create_tables(&conn).unwrap();
        (dir, conn)
    }

    fn sync_trigger(id: &str, repo: &str) -> SyncTrigger {
        SyncTrigger {
            id: Some(id.to_string()),
            repo: repo.to_string(),
            kind: JobKind::Sync,
            url: None,
            new_rev: Some("b".repeat(40)),
            old_rev: Some("a".repeat(40)),
            trigger: "webhook".to_string(),
        }
    }

    fn status_of(conn: &Connection, job_id: &str) -> JobStatus {
        get_job(conn, job_id).unwrap().unwrap().status
    }

    #[test]
    fn duplicate_idempotency_ids_yield_one_job() {
        let (_dir, conn) = setup_test_db();
        let first = enqueue(&conn, &sync_trigger("delivery-1", "demo"), 24).unwrap();
        let second = enqueue(&conn, &sync_trigger("delivery-1", "demo"), 24).unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.job_id, second.job_id);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sync_jobs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn duplicate_trigger_does_not_reset_a_terminal_job() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("delivery-1", "demo"), 24).unwrap();
        let job = claim_next(&conn).unwrap().unwrap();
        complete_job(&conn, &job.job_id, &serde_json::json!({"ok": true}), 24).unwrap();

        let again = enqueue(&conn, &sync_trigger("delivery-1", "demo"), 24).unwrap();
        assert!(!again.created);
        assert_eq!(status_of(&conn, "delivery-1"), JobStatus::Completed);
        assert!(claim_next(&conn).unwrap().is_none());
    }

    #[test]
    fn claim_takes_oldest_pending_job_first() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("j1", "demo"), 24).unwrap();
        enqueue(&conn, &sync_trigger("j2", "demo"), 24).unwrap();
        enqueue(&conn, &sync_trigger("j3", "other"), 24).unwrap();

        let claimed: Vec<String> = std::iter::from_fn(|| claim_next(&conn).unwrap())
            .map(|job| job.job_id)
            .collect();
        assert_eq!(claimed, vec!["j1", "j2", "j3"]);
        assert!(claim_next(&conn).unwrap().is_none());
    }

    #[test]
    fn claimed_job_is_running_with_start_timestamp() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("j1", "demo"), 24).unwrap();
        let job = claim_next(&conn).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());
        assert_eq!(job.old_rev.as_deref(), Some("a".repeat(40).as_str()));
        assert_eq!(status_of(&conn, "j1"), JobStatus::Running);
    }

    fn open_shared(path: &Path) -> Connection {
        db::open_connection(path).unwrap()
    }

    #[test]
    fn concurrent_claims_transition_a_job_exactly_once() {
        let (dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("only-job", "demo"), 24).unwrap();
        let db_path = dir.path().join("state.db");

        let claimers = 8;
        let barrier = Arc::new(Barrier::new(claimers));
        let handles: Vec<_> = (0..claimers)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let db_path = db_path.clone();
                std::thread::spawn(move || {
                    let conn = open_shared(&db_path);
                    barrier.wait();
                    claim_next(&conn).unwrap()
                })
            })
            .collect();

        let winners: Vec<SyncJob> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].job_id, "only-job");
        assert_eq!(status_of(&conn, "only-job"), JobStatus::Running);
    }

    #[test]
    fn terminal_transitions_require_running() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("j1", "demo"), 24).unwrap();

        let err = complete_job(&conn, "j1", &serde_json::json!({}), 24).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { ref from, .. } if from == "pending"));

        claim_next(&conn).unwrap().unwrap();
        fail_job(&conn, "j1", "network_error: could not resolve host", 24).unwrap();
        let job = get_job(&conn, "j1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
        assert_eq!(
            job.error.as_deref(),
            Some("network_error: could not resolve host")
        );

        let err = complete_job(&conn, "j1", &serde_json::json!({}), 24).unwrap_err();
        assert!(matches!(err, StateError::InvalidTransition { ref from, .. } if from == "failed"));
    }

    #[test]
    fn complete_job_stores_result_payload() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("j1", "demo"), 24).unwrap();
        claim_next(&conn).unwrap().unwrap();
        complete_job(&conn, "j1", &serde_json::json!({"files_indexed": 3}), 24).unwrap();
        let job = get_job(&conn, "j1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result.unwrap()["files_indexed"], 3);
    }

    #[test]
    fn cleanup_removes_expired_rows_but_never_running_ones() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("done", "demo"), 24).unwrap();
        claim_next(&conn).unwrap();
        complete_job(&conn, "done", &serde_json::json!({}), 24).unwrap();
        enqueue(&conn, &sync_trigger("running", "demo"), 24).unwrap();
        claim_next(&conn).unwrap();
        enqueue(&conn, &sync_trigger("fresh", "demo"), 24).unwrap();

        conn.execute(
            "UPDATE sync_jobs SET expires_at = '2000-01-01T00:00:00Z' WHERE job_id IN ('done', 'running')",
            [],
        )
        .unwrap();

        assert_eq!(cleanup_expired(&conn, 100).unwrap(), 1);
        assert!(get_job(&conn, "done").unwrap().is_none());
        assert!(get_job(&conn, "running").unwrap().is_some());
        assert!(get_job(&conn, "fresh").unwrap().is_some());
    }

    #[test]
    fn stale_running_jobs_are_failed_not_deleted() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("stuck", "demo"), 24).unwrap();
        claim_next(&conn).unwrap();
        conn.execute(
            "UPDATE sync_jobs SET started_at = '2000-01-01T00:00:00Z' WHERE job_id = 'stuck'",
            [],
        )
        .unwrap();
        enqueue(&conn, &sync_trigger("active", "demo"), 24).unwrap();
        claim_next(&conn).unwrap();

        assert_eq!(fail_stale_running(&conn, 60, 24).unwrap(), 1);
        let stuck = get_job(&conn, "stuck").unwrap().unwrap();
        assert_eq!(stuck.status, JobStatus::Failed);
        assert!(stuck.error.unwrap().starts_with("worker_lost"));
        assert_eq!(status_of(&conn, "active"), JobStatus::Running);
    }

    #[test]
    fn heartbeat_keeps_a_long_job_alive_and_completable() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("long", "demo"), 24).unwrap();
        claim_next(&conn).unwrap();
        conn.execute(
            "UPDATE sync_jobs SET started_at = '2000-01-01T00:00:00Z' WHERE job_id = 'long'",
            [],
        )
        .unwrap();

        assert!(heartbeat(&conn, "long").unwrap());
        assert_eq!(fail_stale_running(&conn, 60, 24).unwrap(), 0);
        complete_job(&conn, "long", &serde_json::json!({"files": 1}), 24).unwrap();
        assert_eq!(status_of(&conn, "long"), JobStatus::Completed);
        assert!(!heartbeat(&conn, "long").unwrap());
    }

    #[test]
    fn stale_heartbeat_counts_as_lost() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("gone", "demo"), 24).unwrap();
        claim_next(&conn).unwrap();
        conn.execute(
            "UPDATE sync_jobs
             SET started_at = '2000-01-01T00:00:00Z', heartbeat_at = '2000-01-01T01:00:00Z'
             WHERE job_id = 'gone'",
            [],
        )
        .unwrap();
        assert_eq!(fail_stale_running(&conn, 60, 24).unwrap(), 1);
        assert_eq!(status_of(&conn, "gone"), JobStatus::Failed);
    }

    #[test]
    fn list_and_count_jobs() {
        let (_dir, conn) = setup_test_db();
        enqueue(&conn, &sync_trigger("a1", "alpha"), 24).unwrap();
        enqueue(&conn, &sync_trigger("b1", "beta"), 24).unwrap();
        enqueue(&conn, &sync_trigger("a2", "alpha"), 24).unwrap();
        claim_next(&conn).unwrap();

        let alpha = list_jobs(&conn, Some("alpha"), None, 10).unwrap();
        let ids: Vec<&str> = alpha.iter().map(|job| job.job_id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);

        let pending = list_jobs(&conn, None, Some(JobStatus::Pending), 10).unwrap();
        assert_eq!(pending.len(), 2);

        let counts = count_by_status(&conn).unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.running, 1);
        assert_eq!(counts.completed, 0);
    }
}
