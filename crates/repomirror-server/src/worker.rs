//! Background sync worker.
//!
//! A process runs at most one polling worker. [`SyncSupervisor`] owns it:
//! `start` spawns the thread unless one is alive, `stop` asks it to exit and
//! joins it. Every job the worker claims ends with a terminal status row, even
//! when the job body panics.

use repomirror_core::config::Config;
use repomirror_core::error::StateError;
use repomirror_core::types::SyncJob;
use repomirror_indexer::IndexLimits;
use repomirror_indexer::job::execute_job;
use repomirror_state::retry::{RetryConfig, with_retry};
use repomirror_state::{db, schema, sync_jobs};
use repomirror_vcs::MirrorStore;
use rusqlite::Connection;
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on one uninterrupted sleep, so `stop` is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);
const CLEANUP_BATCH: usize = 500;
/// Longest gap between heartbeats of a running job.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobDisposition {
    Completed,
    Failed,
}

/// What happened to one claimed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessedJob {
    pub job_id: String,
    pub repo: String,
    pub disposition: JobDisposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything the worker needs to run jobs, built once from configuration.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub store: MirrorStore,
    pub limits: IndexLimits,
    pub retry: RetryConfig,
    pub retention_hours: u32,
    pub stale_running_minutes: u32,
    /// The heartbeat thread opens its own connection with these settings.
    pub db_path: PathBuf,
    pub busy_timeout_ms: u32,
    pub cache_size: i32,
    pub heartbeat_interval: Duration,
}

impl WorkerContext {
    pub fn from_config(config: &Config) -> Self {
        let stale_window =
            Duration::from_secs(u64::from(config.queue.stale_running_minutes.max(1)) * 60);
        Self {
            store: MirrorStore::from_config(config),
            limits: IndexLimits::from(&config.index),
            retry: RetryConfig::from_queue_config(&config.queue),
            retention_hours: config.queue.job_retention_hours,
            stale_running_minutes: config.queue.stale_running_minutes,
            db_path: config.db_path(),
            busy_timeout_ms: config.storage.busy_timeout_ms,
            cache_size: config.storage.cache_size,
            heartbeat_interval: HEARTBEAT_INTERVAL.min(stale_window / 4),
        }
    }
}

/// Claim and run the oldest pending job. `Ok(None)` when the queue is empty.
pub fn process_next_job(
    conn: &mut Connection,
    ctx: &WorkerContext,
) -> Result<Option<ProcessedJob>, StateError> {
    let claimed = with_retry(&ctx.retry, "claim_next", || sync_jobs::claim_next(conn))?;
    let Some(job) = claimed else {
        return Ok(None);
    };
    Ok(Some(run_claimed(conn, ctx, &job)))
}

/// Run a job that is already `running` and write its terminal status.
fn run_claimed(conn: &mut Connection, ctx: &WorkerContext, job: &SyncJob) -> ProcessedJob {
    let started = Instant::now();
    let outcome = with_heartbeat(ctx, &job.job_id, || {
        catch_unwind(AssertUnwindSafe(|| {
            execute_job(conn, &ctx.store, &ctx.limits, job)
        }))
    });

    let (disposition, error) = match outcome {
        Ok(Ok(payload)) => {
            let recorded = with_retry(&ctx.retry, "complete_job", || {
                sync_jobs::complete_job(conn, &job.job_id, &payload, ctx.retention_hours)
            });
            match recorded {
                Ok(()) => (JobDisposition::Completed, None),
                Err(err) => {
                    // The row is still `running`; record it as failed instead.
                    let message = format!("store_error: could not record result: {err}");
                    record_failure(conn, ctx, job, &message);
                    (JobDisposition::Failed, Some(message))
                }
            }
        }
        Ok(Err(err)) => {
            let message = format!("{}: {err}", err.category());
            record_failure(conn, ctx, job, &message);
            (JobDisposition::Failed, Some(message))
        }
        Err(panic) => {
            let message = format!("internal_error: job panicked: {}", panic_message(&*panic));
            record_failure(conn, ctx, job, &message);
            (JobDisposition::Failed, Some(message))
        }
    };

    match &error {
        None => info!(
            job_id = %job.job_id,
            repo = %job.repo,
            duration_ms = started.elapsed().as_millis() as u64,
            "Sync job completed"
        ),
        Some(message) => warn!(
            job_id = %job.job_id,
            repo = %job.repo,
            duration_ms = started.elapsed().as_millis() as u64,
            error = %message,
            "Sync job failed"
        ),
    }
    ProcessedJob {
        job_id: job.job_id.clone(),
        repo: job.repo.clone(),
        disposition,
        error,
    }
}

/// Run `work` while a side thread keeps the job's heartbeat fresh, so stale-job
/// recovery leaves a long import alone.
fn with_heartbeat<T>(ctx: &WorkerContext, job_id: &str, work: impl FnOnce() -> T) -> T {
    std::thread::scope(|scope| {
        let (stop, stopped) = mpsc::channel::<()>();
        scope.spawn(move || beat(ctx, job_id, stopped));
        let result = work();
        drop(stop);
        result
    })
}

fn beat(ctx: &WorkerContext, job_id: &str, stopped: Receiver<()>) {
    let conn = match db::open_connection_with_config(
        &ctx.db_path,
        ctx.busy_timeout_ms,
        ctx.cache_size,
    ) {
        Ok(conn) => conn,
        Err(err) => {
            warn!(job_id, error = %err, "Heartbeat could not open the state database");
            return;
        }
    };
    while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(ctx.heartbeat_interval) {
        match sync_jobs::heartbeat(&conn, job_id) {
            Ok(true) => debug!(job_id, "Job heartbeat"),
            Ok(false) => {
                warn!(job_id, "Job is no longer running; heartbeat stopped");
                return;
            }
            Err(err) => warn!(job_id, error = %err, "Could not record job heartbeat"),
        }
    }
}

fn record_failure(conn: &Connection, ctx: &WorkerContext, job: &SyncJob, message: &str) {
    let recorded = with_retry(&ctx.retry, "fail_job", || {
        sync_jobs::fail_job(conn, &job.job_id, message, ctx.retention_hours)
    });
    if let Err(err) = recorded {
        // Stale-running recovery will fail the job later.
        error!(job_id = %job.job_id, error = %err, "Could not record job failure");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Delete expired jobs and fail jobs abandoned in `running`.
pub fn run_maintenance(conn: &Connection, ctx: &WorkerContext) -> Result<(usize, usize), StateError> {
    let stale = with_retry(&ctx.retry, "fail_stale_running", || {
        sync_jobs::fail_stale_running(conn, ctx.stale_running_minutes, ctx.retention_hours)
    })?;
    let expired = with_retry(&ctx.retry, "cleanup_expired", || {
        sync_jobs::cleanup_expired(conn, CLEANUP_BATCH)
    })?;
    Ok((expired, stale))
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub running: bool,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
}

struct Shared {
    config: Config,
    running: AtomicBool,
    stop_requested: AtomicBool,
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
}

/// Owner of the per-process sync worker thread.
pub struct SyncSupervisor {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncSupervisor {
    pub fn new(config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                jobs_processed: AtomicU64::new(0),
                jobs_failed: AtomicU64::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Spawn the worker thread. Returns false if one is already running.
    pub fn start(&self) -> std::io::Result<bool> {
        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(false);
        }
        self.shared.stop_requested.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("repomirror-sync-worker".to_string())
            .spawn(move || {
                let _guard = RunningGuard(&shared.running);
                worker_loop(&shared);
            });
        match spawned {
            Ok(handle) => {
                if let Ok(mut slot) = self.handle.lock()
                    && let Some(previous) = slot.replace(handle)
                {
                    let _ = previous.join();
                }
                info!("Sync worker started");
                Ok(true)
            }
            Err(err) => {
                self.shared.running.store(false, Ordering::Release);
                Err(err)
            }
        }
    }

    /// Start the worker if it is not alive. Logs instead of failing.
    pub fn ensure_running(&self) -> bool {
        match self.start() {
            Ok(started) => started,
            Err(err) => {
                error!(error = %err, "Failed to start sync worker");
                false
            }
        }
    }

    /// Ask the worker to exit after its current job and wait for it.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::Release);
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Sync worker thread panicked");
            }
            info!("Sync worker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            running: self.is_running(),
            jobs_processed: self.shared.jobs_processed.load(Ordering::Relaxed),
            jobs_failed: self.shared.jobs_failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SyncSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Clears the running flag however the worker thread exits.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn worker_loop(shared: &Shared) {
    let config = &shared.config;
    let ctx = WorkerContext::from_config(config);
    let poll_interval = config.queue.poll_interval();
    let cleanup_interval = config.queue.cleanup_interval();
    let mut conn: Option<Connection> = None;
    let mut last_cleanup: Option<Instant> = None;

    while !shared.stop_requested.load(Ordering::Acquire) {
        if conn.is_none() {
            match open_worker_connection(config) {
                Ok(opened) => conn = Some(opened),
                Err(err) => {
                    error!(error = %err, "Sync worker could not open the state database");
                    sleep_unless_stopped(shared, poll_interval);
                    continue;
                }
            }
        }
        let Some(active) = conn.as_mut() else {
            continue;
        };

        if last_cleanup.is_none_or(|at| at.elapsed() >= cleanup_interval) {
            match run_maintenance(active, &ctx) {
                Ok((expired, stale)) => debug!(expired, stale, "Queue maintenance complete"),
                Err(err) => warn!(error = %err, "Queue maintenance failed"),
            }
            last_cleanup = Some(Instant::now());
        }

        match process_next_job(active, &ctx) {
            Ok(Some(processed)) => {
                shared.jobs_processed.fetch_add(1, Ordering::Relaxed);
                if processed.disposition == JobDisposition::Failed {
                    shared.jobs_failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(None) => sleep_unless_stopped(shared, poll_interval),
            Err(err) => {
                warn!(error = %err, "Claiming the next job failed; reopening connection");
                conn = None;
                sleep_unless_stopped(shared, poll_interval);
            }
        }
    }
}

fn open_worker_connection(config: &Config) -> Result<Connection, StateError> {
    let conn = db::open_connection_with_config(
        &config.db_path(),
        config.storage.busy_timeout_ms,
        config.storage.cache_size,
    )?;
    schema::create_tables(&conn)?;
    Ok(conn)
}

fn sleep_unless_stopped(shared: &Shared, total: Duration) {
    let deadline = Instant::now() + total;
    while !shared.stop_requested.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
