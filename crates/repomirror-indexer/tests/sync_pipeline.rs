use git2::{Repository, Signature};
use repomirror_core::types::{JobKind, JobStatus, SyncJob};
use repomirror_indexer::import::initial_import;
use repomirror_indexer::job::execute_job;
use repomirror_indexer::sync_incremental::{DeltaOutcome, delta_sync};
use repomirror_indexer::{IndexLimits, should_index};
use repomirror_state::{db, files, repositories, schema};
use repomirror_vcs::MirrorStore;
use repomirror_vcs::command::GitRunner;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

struct Upstream {
    dir: TempDir,
    repo: Repository,
}

impl Upstream {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        Self { dir, repo }
    }

    fn url(&self) -> String {
        self.dir.path().to_string_lossy().into_owned()
    }

    fn commit(&self, writes: &[(&str, &str)], removes: &[&str]) -> String {
        let mut index = self.repo.index().unwrap();
        for (path, content) in writes {
            let full = self.dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        for path in removes {
            std::fs::remove_file(self.dir.path().join(path)).unwrap();
            index.remove_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Dev", "dev@example.com").unwrap();
        let parent = self.repo.head().ok().and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, "change", &tree, &parents)
            .unwrap()
            .to_string()
    }
}

struct Harness {
    _state_dir: TempDir,
    _mirror_dir: TempDir,
    conn: Connection,
    store: MirrorStore,
    limits: IndexLimits,
}

impl Harness {
    fn new() -> Self {
        let state_dir = tempfile::tempdir().unwrap();
        let conn = db::open_connection(&state_dir.path().join("state.db")).unwrap();
        schema::create_tables(&conn).unwrap();
        let mirror_dir = tempfile::tempdir().unwrap();
        let store = MirrorStore::new(
            mirror_dir.path().join("mirrors"),
            GitRunner::new("git", Duration::from_secs(60)),
            None,
            Duration::from_secs(120),
            Duration::from_secs(120),
        );
        Self {
            _state_dir: state_dir,
            _mirror_dir: mirror_dir,
            conn,
            store,
            limits: IndexLimits::default(),
        }
    }

    fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = files::search_by_path(&self.conn, "demo", "", None, 100)
            .unwrap()
            .into_iter()
            .map(|file| file.path)
            .collect();
        paths.sort();
        paths
    }
}

const PY_SOURCE: &str = "import os\n\nclass Loader:\n    pass\n\ndef run():\n    return os.getcwd()\n";

#[test]
fn import_indexes_only_qualifying_files() {
    let upstream = Upstream::new();
    let commit = upstream.commit(
        &[
            ("src/a.py", PY_SOURCE),
            ("node_modules/x.js", "module.exports = 1;\n"),
            ("src/empty.py", ""),
        ],
        &[],
    );
    let mut harness = Harness::new();

    let outcome = initial_import(
        &mut harness.conn,
        &harness.store,
        &harness.limits,
        &upstream.url(),
        "demo",
    )
    .unwrap();

    assert!(!should_index("node_modules/x.js"));
    assert_eq!(outcome.commit, commit);
    assert!(outcome.mirror_created);
    assert_eq!(outcome.stats.files_indexed, 2);
    assert_eq!(outcome.stats.files_skipped, 1);
    assert_eq!(outcome.stats.errors, 0);
    assert_eq!(harness.paths(), vec!["src/a.py", "src/empty.py"]);

    let record = files::get_file(&harness.conn, "demo", "src/a.py").unwrap().unwrap();
    assert_eq!(record.language.as_deref(), Some("python"));
    assert_eq!(record.functions, vec!["run".to_string()]);
    assert_eq!(record.classes, vec!["Loader".to_string()]);
    assert_eq!(record.commit.as_deref(), Some(commit.as_str()));

    let metadata = repositories::get_repository(&harness.conn, "demo").unwrap().unwrap();
    assert_eq!(metadata.last_commit.as_deref(), Some(commit.as_str()));
    assert_eq!(metadata.file_count, 2);
    assert_eq!(metadata.last_sync_status.as_deref(), Some("imported"));
    assert!(metadata.default_branch.is_some());
}

#[test]
fn reimport_reuses_mirror_and_is_idempotent() {
    let upstream = Upstream::new();
    upstream.commit(&[("src/a.py", PY_SOURCE)], &[]);
    let mut harness = Harness::new();
    let url = upstream.url();

    initial_import(&mut harness.conn, &harness.store, &harness.limits, &url, "demo").unwrap();
    let again =
        initial_import(&mut harness.conn, &harness.store, &harness.limits, &url, "demo").unwrap();
    assert!(!again.mirror_created);
    assert_eq!(again.stats.files_removed, 0);
    assert_eq!(harness.paths(), vec!["src/a.py"]);
}

#[test]
fn delta_sync_applies_rename_edit_and_delete() {
    let upstream = Upstream::new();
    let first = upstream.commit(
        &[
            ("src/a.py", PY_SOURCE),
            ("src/keep.py", "def keep():\n    pass\n"),
            ("src/gone.py", "def gone():\n    pass\n"),
        ],
        &[],
    );
    let mut harness = Harness::new();
    initial_import(
        &mut harness.conn,
        &harness.store,
        &harness.limits,
        &upstream.url(),
        "demo",
    )
    .unwrap();

    let second = upstream.commit(
        &[
            ("src/b.py", PY_SOURCE),
            ("src/keep.py", "def keep():\n    pass\n\ndef extra():\n    pass\n"),
            ("dist/bundle.js", "var a = 1;\n"),
        ],
        &["src/a.py", "src/gone.py"],
    );

    let outcome = delta_sync(
        &mut harness.conn,
        &harness.store,
        &harness.limits,
        "demo",
        &second,
        None,
    )
    .unwrap();

    let DeltaOutcome::Synced {
        old_rev,
        new_rev,
        stats,
        ..
    } = outcome
    else {
        panic!("expected a synced outcome");
    };
    assert_eq!(old_rev, first);
    assert_eq!(new_rev, second);
    assert_eq!(stats.files_renamed, 1);
    assert_eq!(stats.files_removed, 1);
    assert_eq!(stats.files_indexed, 2);
    assert_eq!(stats.files_skipped, 1);
    assert_eq!(stats.errors, 0);

    assert_eq!(harness.paths(), vec!["src/b.py", "src/keep.py"]);
    let keep = files::get_file(&harness.conn, "demo", "src/keep.py").unwrap().unwrap();
    assert_eq!(keep.functions, vec!["keep".to_string(), "extra".to_string()]);

    let metadata = repositories::get_repository(&harness.conn, "demo").unwrap().unwrap();
    assert_eq!(metadata.last_commit.as_deref(), Some(second.as_str()));
    assert_eq!(metadata.last_sync_status.as_deref(), Some("synced"));
    assert_eq!(metadata.file_count, 2);
}

#[test]
fn delta_sync_to_recorded_revision_is_up_to_date() {
    let upstream = Upstream::new();
    let commit = upstream.commit(&[("src/a.py", PY_SOURCE)], &[]);
    let mut harness = Harness::new();
    initial_import(
        &mut harness.conn,
        &harness.store,
        &harness.limits,
        &upstream.url(),
        "demo",
    )
    .unwrap();
    let before = harness.paths();

    let outcome = delta_sync(
        &mut harness.conn,
        &harness.store,
        &harness.limits,
        "demo",
        &commit,
        None,
    )
    .unwrap();
    assert!(matches!(outcome, DeltaOutcome::UpToDate { .. }));
    assert_eq!(harness.paths(), before);
}

#[test]
fn sync_job_without_history_falls_back_to_import() {
    let upstream = Upstream::new();
    let commit = upstream.commit(&[("src/a.py", PY_SOURCE)], &[]);
    let mut harness = Harness::new();
    let job = SyncJob {
        job_id: "sync-1".into(),
        repo: "demo".into(),
        kind: JobKind::Sync,
        url: Some(upstream.url()),
        old_rev: None,
        new_rev: Some(commit.clone()),
        trigger: "webhook".into(),
        status: JobStatus::Running,
        created_at: "2026-01-01T00:00:00Z".into(),
        started_at: None,
        completed_at: None,
        result: None,
        error: None,
        expires_at: "2026-01-02T00:00:00Z".into(),
    };

    let payload = execute_job(&mut harness.conn, &harness.store, &harness.limits, &job).unwrap();
    assert_eq!(payload["commit"], serde_json::json!(commit));
    assert_eq!(payload["stats"]["files_indexed"], serde_json::json!(1));
    assert_eq!(harness.paths(), vec!["src/a.py"]);
}
