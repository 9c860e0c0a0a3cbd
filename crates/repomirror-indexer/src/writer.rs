use crate::record::{IndexLimits, build_record};
use repomirror_core::error::StateError;
use repomirror_state::files;
use rusqlite::Connection;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    /// Over the size ceiling; any previous record for the path was removed.
    SkippedTooLarge,
}

/// Build and upsert the record for one file.
pub fn index_file(
    conn: &Connection,
    repo: &str,
    path: &str,
    content: &str,
    commit: Option<&str>,
    limits: &IndexLimits,
) -> Result<IndexOutcome, StateError> {
    match build_record(repo, path, content, commit, limits) {
        Some(record) => {
            files::upsert_file(conn, &record)?;
            Ok(IndexOutcome::Indexed)
        }
        None => {
            debug!(repo, path, size = content.len(), "Skipped: file too large");
            files::delete_files(conn, repo, &[path.to_string()])?;
            Ok(IndexOutcome::SkippedTooLarge)
        }
    }
}

/// Delete the records for `paths`. Returns how many existed.
pub fn remove_files(conn: &Connection, repo: &str, paths: &[String]) -> Result<usize, StateError> {
    files::delete_files(conn, repo, paths)
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

    #[test]
    fn index_then_remove_leaves_no_record() {
        let (_dir, conn) = setup_test_db();
        let limits = IndexLimits::default();
        let outcome = index_file(&conn, "demo", "src/a.py", "def a(): pass\n", Some("c1"), &limits).unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed);
        assert!(files::get_file(&conn, "demo", "src/a.py").unwrap().is_some());

        assert_eq!(remove_files(&conn, "demo", &["src/a.py".to_string()]).unwrap(), 1);
        assert!(files::get_file(&conn, "demo", "src/a.py").unwrap().is_none());
    }

    #[test]
    fn reindexing_replaces_the_record() {
        let (_dir, conn) = setup_test_db();
        let limits = IndexLimits::default();
        index_file(&conn, "demo", "a.py", "def old(): pass\n", Some("c1"), &limits).unwrap();
        index_file(&conn, "demo", "a.py", "def new(): pass\n", Some("c2"), &limits).unwrap();
        let record = files::get_file(&conn, "demo", "a.py").unwrap().unwrap();
        assert_eq!(record.functions, vec!["new"]);
        assert_eq!(record.commit.as_deref(), Some("c2"));
        assert_eq!(files::count_files(&conn, "demo").unwrap(), 1);
    }

    #[test]
    fn growing_past_the_ceiling_drops_the_stale_record() {
        let (_dir, conn) = setup_test_db();
        let limits = IndexLimits {
            max_file_size: 8,
            ..IndexLimits::default()
        };
        index_file(&conn, "demo", "a.py", "x = 1\n", None, &limits).unwrap();
        let outcome = index_file(&conn, "demo", "a.py", &"x".repeat(100), None, &limits).unwrap();
        assert_eq!(outcome, IndexOutcome::SkippedTooLarge);
        assert!(files::get_file(&conn, "demo", "a.py").unwrap().is_none());
    }
}
