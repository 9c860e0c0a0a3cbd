use super::{open_state, print_json};
use anyhow::{Result, anyhow};
use repomirror_core::config::Config;
use repomirror_core::types::{JobKind, SyncTrigger};
use repomirror_query::jobs::{get_job_status, list_job_status, submit_trigger};
use repomirror_server::worker::{WorkerContext, run_maintenance};
use serde_json::json;

pub struct EnqueueArgs {
    pub name: String,
    pub kind: String,
    pub url: Option<String>,
    pub rev: Option<String>,
    pub old_rev: Option<String>,
    pub id: Option<String>,
}

pub fn enqueue(config: &Config, args: EnqueueArgs) -> Result<()> {
    let kind = JobKind::parse(&args.kind)
        .ok_or_else(|| anyhow!("Unknown job kind '{}': expected sync or import", args.kind))?;
    let trigger = SyncTrigger {
        id: args.id,
        repo: args.name,
        kind,
        url: args.url,
        new_rev: args.rev,
        old_rev: args.old_rev,
        trigger: "cli".to_string(),
    };
    let conn = open_state(config)?;
    let outcome = submit_trigger(&conn, &trigger, &config.queue)?;
    if !outcome.created {
        eprintln!("Job {} already queued; trigger absorbed", outcome.job_id);
    }
    print_json(&outcome)
}

pub fn show(config: &Config, job_id: &str) -> Result<()> {
    let conn = open_state(config)?;
    print_json(&get_job_status(&conn, job_id, &config.queue)?)
}

pub fn list(config: &Config, repo: Option<&str>, status: Option<&str>, limit: usize) -> Result<()> {
    let conn = open_state(config)?;
    let limit = config.search.effective_limit(Some(limit));
    print_json(&list_job_status(&conn, repo, status, limit, &config.queue)?)
}

pub fn cleanup(config: &Config) -> Result<()> {
    let conn = open_state(config)?;
    let ctx = WorkerContext::from_config(config);
    let (expired, stale) = run_maintenance(&conn, &ctx)?;
    print_json(&json!({
        "expired_jobs_deleted": expired,
        "stale_jobs_failed": stale,
    }))
}
