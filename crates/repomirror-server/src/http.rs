//! HTTP surface for the inbound sync trigger and the query interfaces.
//!
//! Routes:
//! - `POST /hooks/sync`            enqueue a sync or import job
//! - `GET  /jobs`, `/jobs/{id}`    job listing and status
//! - `GET  /repos`                 tracked repositories
//! - `GET  /repos/{repo}/search`   content, filename, function or class search
//! - `GET  /repos/{repo}/commit`   commit metadata with paged changed files
//! - `GET  /repos/{repo}/stats`    file, commit and language counts
//! - `GET  /health`                store, queue and worker health

use crate::worker::SyncSupervisor;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use repomirror_core::config::Config;
use repomirror_core::error::{ErrorCode, QueryError};
use repomirror_core::types::SyncTrigger;
use repomirror_query::search::{SearchMode, SearchRequest, search};
use repomirror_query::{commit, jobs, stats};
use repomirror_state::{db, repositories, schema, sync_jobs};
use repomirror_vcs::MirrorStore;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared state for every handler.
pub struct AppState {
    pub config: Config,
    pub store: MirrorStore,
    pub supervisor: Arc<SyncSupervisor>,
    pub server_start: Instant,
}

impl AppState {
    pub fn new(config: Config, supervisor: Arc<SyncSupervisor>) -> Self {
        Self {
            store: MirrorStore::from_config(&config),
            config,
            supervisor,
            server_start: Instant::now(),
        }
    }

    fn open_connection(&self) -> Result<Connection, QueryError> {
        let conn = db::open_connection_with_config(
            &self.config.db_path(),
            self.config.storage.busy_timeout_ms,
            self.config.storage.cache_size,
        )?;
        schema::create_tables(&conn)?;
        Ok(conn)
    }
}

/// Structured error body: `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub enum ApiError {
    Query(QueryError),
    Internal(String),
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self::Query(err)
    }
}

/// A query string that fails to deserialize is the caller's mistake.
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Query(QueryError::invalid_input("query", rejection.body_text()))
    }
}

impl ApiError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::Query(err) => err.code(),
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorCode::RepoNotFound | ErrorCode::JobNotFound => StatusCode::NOT_FOUND,
        ErrorCode::NotIndexed => StatusCode::CONFLICT,
        ErrorCode::VcsError => StatusCode::BAD_GATEWAY,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let message = match &self {
            Self::Query(err) => err.to_string(),
            Self::Internal(message) => message.clone(),
        };
        if code == ErrorCode::InternalError {
            warn!(error = %message, "Request failed");
        }
        let body = json!({
            "error": {
                "code": code.as_str(),
                "message": message,
            }
        });
        (status_for(code), Json(body)).into_response()
    }
}

/// Run store and subprocess work off the async runtime with a fresh connection.
async fn blocking<T, F>(state: &Arc<AppState>, work: F) -> Result<Json<T>, ApiError>
where
    T: Serialize + Send + 'static,
    F: FnOnce(&AppState, &Connection) -> Result<T, QueryError> + Send + 'static,
{
    let state = Arc::clone(state);
    let joined = tokio::task::spawn_blocking(move || {
        let conn = state.open_connection()?;
        work(&*state, &conn)
    })
    .await;
    match joined {
        Ok(result) => Ok(Json(result?)),
        Err(err) => Err(ApiError::Internal(format!("internal error: {err}"))),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/hooks/sync", post(sync_hook_handler))
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/{id}", get(job_status_handler))
        .route("/repos", get(list_repos_handler))
        .route("/repos/{repo}/search", get(search_handler))
        .route("/repos/{repo}/commit", get(commit_handler))
        .route("/repos/{repo}/stats", get(stats_handler))
        .with_state(state)
}

/// Bind, start the sync worker, and serve until Ctrl-C.
pub async fn run_http_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let supervisor = Arc::new(SyncSupervisor::new(config.clone()));
    supervisor.start()?;

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let state = Arc::new(AppState::new(config, Arc::clone(&supervisor)));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("Shutting down; waiting for the sync worker");
    tokio::task::spawn_blocking(move || supervisor.stop()).await?;
    Ok(())
}

/// POST /hooks/sync
async fn sync_hook_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let trigger: SyncTrigger = match serde_json::from_slice(&body) {
        Ok(trigger) => trigger,
        Err(e) => {
            return ApiError::Query(QueryError::invalid_input(
                "body",
                format!("invalid trigger payload: {e}"),
            ))
            .into_response();
        }
    };

    match blocking(&state, move |state, conn| {
        jobs::submit_trigger(conn, &trigger, &state.config.queue)
    })
    .await
    {
        Ok(outcome) => {
            state.supervisor.ensure_running();
            (StatusCode::ACCEPTED, outcome).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct JobListParams {
    repo: Option<String>,
    status: Option<String>,
    limit: Option<usize>,
}

/// GET /jobs
async fn list_jobs_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<JobListParams>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(params) = params?;
    blocking(&state, move |state, conn| {
        let limit = state.config.search.effective_limit(params.limit);
        let jobs = jobs::list_job_status(
            conn,
            params.repo.as_deref(),
            params.status.as_deref(),
            limit,
            &state.config.queue,
        )?;
        Ok(json!({ "jobs": jobs }))
    })
    .await
}

/// GET /jobs/{id}
async fn job_status_handler(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<jobs::JobStatusView>, ApiError> {
    blocking(&state, move |state, conn| {
        jobs::get_job_status(conn, &job_id, &state.config.queue)
    })
    .await
}

/// GET /repos
async fn list_repos_handler(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    blocking(&state, |_, conn| {
        let repos = repositories::list_repositories(conn)?;
        Ok(json!({ "repositories": repos }))
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    mode: Option<String>,
    glob: Option<String>,
    lang: Option<String>,
    case_sensitive: Option<bool>,
    #[serde(rename = "ref")]
    reference: Option<String>,
    limit: Option<usize>,
}

/// GET /repos/{repo}/search
async fn search_handler(
    State(state): State<Arc<AppState>>,
    Path(repo): Path<String>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<repomirror_query::search::SearchResponse>, ApiError> {
    let Query(params) = params?;
    let mode = match params.mode.as_deref() {
        Some(raw) => SearchMode::parse(raw).ok_or_else(|| {
            QueryError::invalid_input("mode", format!("unknown search mode '{raw}'"))
        })?,
        None => SearchMode::default(),
    };
    blocking(&state, move |state, conn| {
        let request = SearchRequest {
            repo: &repo,
            query: params.q.as_deref().unwrap_or_default(),
            mode,
            file_glob: params.glob.as_deref(),
            language: params.lang.as_deref(),
            case_sensitive: params.case_sensitive.unwrap_or(false),
            reference: params.reference.as_deref(),
            limit: params.limit,
        };
        search(conn, &state.store, &state.config.search, &request)
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
struct CommitParams {
    #[serde(rename = "ref")]
    reference: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

/// GET /repos/{repo}/commit
async fn commit_handler(
    State(state): State<Arc<AppState>>,
    Path(repo): Path<String>,
    params: Result<Query<CommitParams>, QueryRejection>,
) -> Result<Json<repomirror_vcs::commit::CommitInfo>, ApiError> {
    let Query(params) = params?;
    blocking(&state, move |state, conn| {
        commit::last_commit_info(
            conn,
            &state.store,
            &repo,
            params.reference.as_deref(),
            params.offset.unwrap_or(0),
            params.limit,
            state.config.search.max_limit,
        )
    })
    .await
}

/// GET /repos/{repo}/stats
async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Path(repo): Path<String>,
) -> Result<Json<stats::RepoStats>, ApiError> {
    blocking(&state, move |state, conn| stats::get_repo_stats(conn, &state.store, &repo)).await
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    let worker = state.supervisor.status();
    let uptime_seconds = state.server_start.elapsed().as_secs();
    let result = tokio::task::spawn_blocking({
        let state = Arc::clone(&state);
        move || build_health_store_section(&state)
    })
    .await;
    let store = match result {
        Ok(section) => section,
        Err(e) => json!({ "sqlite_ok": false, "sqlite_error": format!("internal error: {e}") }),
    };
    let healthy = store.get("sqlite_ok").and_then(Value::as_bool) == Some(true) && worker.running;
    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": uptime_seconds,
        "store": store,
        "worker": worker,
    });
    Json(body).into_response()
}

fn build_health_store_section(state: &AppState) -> Value {
    let conn = match state.open_connection() {
        Ok(conn) => conn,
        Err(err) => {
            warn!(error = %err, "Failed to open sqlite connection for /health");
            return json!({ "sqlite_ok": false, "sqlite_error": err.to_string() });
        }
    };
    let (sqlite_ok, sqlite_error) = db::check_sqlite_health(&conn)
        .unwrap_or_else(|err| (false, Some(err.to_string())));
    let queue = sync_jobs::count_by_status(&conn).ok();
    let repositories = repositories::list_repositories(&conn)
        .map(|repos| repos.len())
        .ok();
    json!({
        "sqlite_ok": sqlite_ok,
        "sqlite_error": sqlite_error,
        "queue": queue,
        "repositories": repositories,
    })
}
