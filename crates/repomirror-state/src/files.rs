use crate::db::sqlite_error;
use repomirror_core::error::StateError;
use repomirror_core::types::IndexedFile;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;

const FILE_COLUMNS: &str = "repo, path, filename, language, size_bytes, line_count, \"commit\",
     imports, functions, classes, search_text, indexed_at";

/// Which extracted name list a symbol query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Class,
}

impl SymbolKind {
    fn column(self) -> &'static str {
        match self {
            Self::Function => "functions",
            Self::Class => "classes",
        }
    }
}

/// A record matched by a symbol query, with the names that matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMatch {
    pub file: IndexedFile,
    pub names: Vec<String>,
}

/// Escape `%`, `_` and the escape character itself for use in a
/// `LIKE ... ESCAPE '\'` pattern, so user input only ever matches literally.
pub fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn contains_pattern(raw: &str) -> String {
    format!("%{}%", escape_like(raw))
}

/// Insert or replace the record for `(repo, path)`.
pub fn upsert_file(conn: &Connection, file: &IndexedFile) -> Result<(), StateError> {
    let imports = serde_json::to_string(&file.imports).map_err(StateError::serialization)?;
    let functions = serde_json::to_string(&file.functions).map_err(StateError::serialization)?;
    let classes = serde_json::to_string(&file.classes).map_err(StateError::serialization)?;
    conn.execute(
        "INSERT INTO indexed_files (
             repo, path, filename, language, size_bytes, line_count, \"commit\",
             imports, functions, classes, search_text, indexed_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(repo, path) DO UPDATE SET
             filename = excluded.filename,
             language = excluded.language,
             size_bytes = excluded.size_bytes,
             line_count = excluded.line_count,
             \"commit\" = excluded.\"commit\",
             imports = excluded.imports,
             functions = excluded.functions,
             classes = excluded.classes,
             search_text = excluded.search_text,
             indexed_at = excluded.indexed_at",
        params![
            file.repo,
            file.path,
            file.filename,
            file.language,
            file.size_bytes as i64,
            file.line_count as i64,
            file.commit,
            imports,
            functions,
            classes,
            file.search_text,
            file.indexed_at,
        ],
    )
    .map_err(sqlite_error)?;
    Ok(())
}

/// Delete the records for `paths`. Returns how many existed.
pub fn delete_files(conn: &Connection, repo: &str, paths: &[String]) -> Result<usize, StateError> {
    if paths.is_empty() {
        return Ok(0);
    }
    let mut stmt = conn
        .prepare("DELETE FROM indexed_files WHERE repo = ?1 AND path = ?2")
        .map_err(sqlite_error)?;
    let mut deleted = 0;
    for path in paths {
        deleted += stmt.execute(params![repo, path]).map_err(sqlite_error)?;
    }
    Ok(deleted)
}

/// Delete every record for a repository.
pub fn delete_all_for_repo(conn: &Connection, repo: &str) -> Result<usize, StateError> {
    conn.execute("DELETE FROM indexed_files WHERE repo = ?1", params![repo])
        .map_err(sqlite_error)
}

/// Delete records not stamped with `commit`, i.e. left over from an earlier import.
pub fn delete_not_at_commit(conn: &Connection, repo: &str, commit: &str) -> Result<usize, StateError> {
    conn.execute(
        "DELETE FROM indexed_files
         WHERE repo = ?1 AND (\"commit\" IS NULL OR \"commit\" != ?2)",
        params![repo, commit],
    )
    .map_err(sqlite_error)
}

pub fn get_file(conn: &Connection, repo: &str, path: &str) -> Result<Option<IndexedFile>, StateError> {
    conn.query_row(
        &format!("SELECT {FILE_COLUMNS} FROM indexed_files WHERE repo = ?1 AND path = ?2"),
        params![repo, path],
        row_to_file,
    )
    .optional()
    .map_err(sqlite_error)
}

/// Fetch records for a set of paths, keyed by path. Missing paths are skipped.
pub fn get_files_by_paths(
    conn: &Connection,
    repo: &str,
    paths: &[&str],
) -> Result<HashMap<String, IndexedFile>, StateError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM indexed_files WHERE repo = ?1 AND path = ?2"
        ))
        .map_err(sqlite_error)?;
    let mut found = HashMap::new();
    for path in paths {
        if found.contains_key(*path) {
            continue;
        }
        if let Some(file) = stmt
            .query_row(params![repo, path], row_to_file)
            .optional()
            .map_err(sqlite_error)?
        {
            found.insert(file.path.clone(), file);
        }
    }
    Ok(found)
}

pub fn count_files(conn: &Connection, repo: &str) -> Result<u64, StateError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM indexed_files WHERE repo = ?1",
            params![repo],
            |row| row.get(0),
        )
        .map_err(sqlite_error)?;
    Ok(count.max(0) as u64)
}

/// Records whose path contains `needle`, exact filename matches first.
pub fn search_by_path(
    conn: &Connection,
    repo: &str,
    needle: &str,
    language: Option<&str>,
    limit: usize,
) -> Result<Vec<IndexedFile>, StateError> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {FILE_COLUMNS}
             FROM indexed_files
             WHERE repo = ?1
               AND path LIKE ?2 ESCAPE '\\'
               AND (?3 IS NULL OR language = ?3)
             ORDER BY CASE
                        WHEN lower(filename) = lower(?4) THEN 0
                        WHEN filename LIKE ?2 ESCAPE '\\' THEN 1
                        ELSE 2
                      END,
                      length(path) ASC,
                      path ASC
             LIMIT ?5"
        ))
        .map_err(sqlite_error)?;
    let rows = stmt
        .query_map(
            params![
                repo,
                contains_pattern(needle),
                language,
                needle,
                limit.max(1) as i64
            ],
            row_to_file,
        )
        .map_err(sqlite_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(sqlite_error)
}

/// Records whose extracted function or class names contain `needle`
/// (case-insensitive).
pub fn search_by_symbol(
    conn: &Connection,
    repo: &str,
    kind: SymbolKind,
    needle: &str,
    language: Option<&str>,
    limit: usize,
) -> Result<Vec<SymbolMatch>, StateError> {
    let column = kind.column();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {FILE_COLUMNS}
             FROM indexed_files
             WHERE repo = ?1
               AND {column} LIKE ?2 ESCAPE '\\'
               AND (?3 IS NULL OR language = ?3)
             ORDER BY path ASC"
        ))
        .map_err(sqlite_error)?;
    let rows = stmt
        .query_map(
            params![repo, contains_pattern(needle), language],
            row_to_file,
        )
        .map_err(sqlite_error)?;

    let lowered = needle.to_lowercase();
    let mut matches = Vec::new();
    for row in rows {
        let file = row.map_err(sqlite_error)?;
        let names: Vec<String> = match kind {
            SymbolKind::Function => &file.functions,
            SymbolKind::Class => &file.classes,
        }
        .iter()
        .filter(|name| name.to_lowercase().contains(&lowered))
        .cloned()
        .collect();
        // The LIKE pre-filter runs over the JSON text, so confirm against the names.
        if names.is_empty() {
            continue;
        }
        matches.push(SymbolMatch { file, names });
        if matches.len() >= limit.max(1) {
            break;
        }
    }
    Ok(matches)
}

/// File counts per detected language, largest first.
pub fn language_histogram(conn: &Connection, repo: &str) -> Result<Vec<(String, u64)>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT COALESCE(language, 'unknown'), COUNT(*)
             FROM indexed_files
             WHERE repo = ?1
             GROUP BY COALESCE(language, 'unknown')
             ORDER BY COUNT(*) DESC, 1 ASC",
        )
        .map_err(sqlite_error)?;
    let rows = stmt
        .query_map(params![repo], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })
        .map_err(sqlite_error)?;
    rows.map(|row| {
        row.map(|(language, count)| (language, count.max(0) as u64))
            .map_err(sqlite_error)
    })
    .collect()
}

fn row_to_file(row: &Row<'_>) -> rusqlite::Result<IndexedFile> {
    let size_bytes: i64 = row.get(4)?;
    let line_count: i64 = row.get(5)?;
    let imports: String = row.get(7)?;
    let functions: String = row.get(8)?;
    let classes: String = row.get(9)?;
    Ok(IndexedFile {
        repo: row.get(0)?,
        path: row.get(1)?,
        filename: row.get(2)?,
        language: row.get(3)?,
        size_bytes: size_bytes.max(0) as u64,
        line_count: line_count.max(0) as u64,
        commit: row.get(6)?,
        imports: serde_json::from_str(&imports).unwrap_or_default(),
        functions: serde_json::from_str(&functions).unwrap_or_default(),
        classes: serde_json::from_str(&classes).unwrap_or_default(),
        search_text: row.get(10)?,
        indexed_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, schema};
    use tempfile::{TempDir, tempdir};

    fn setup_test_db() -> (TempDir, Connection) {
        let dir = tempdir().unwrap();
        let conn = db::open_connection(&dir.path().join("state.db")).unwrap();
        schema::create_tables(&conn).unwrap();
        (dir, conn)
    }

    fn record(repo: &str, path: &str, language: &str) -> IndexedFile {
        IndexedFile {
            repo: repo.to_string(),
            path: path.to_string(),
            filename: path.rsplit('/').next().unwrap().to_string(),
            language: Some(language.to_string()),
            size_bytes: 120,
            line_count: 8,
            commit: Some("a".repeat(40)),
            imports: vec!["os".to_string()],
            functions: vec!["load_config".to_string(), "main".to_string()],
            classes: vec!["ConfigLoader".to_string()],
            search_text: path.to_string(),
            indexed_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn escape_like_neutralizes_wildcards() {
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn upsert_then_delete_leaves_no_record() {
        let (_dir, conn) = setup_test_db();
        upsert_file(&conn, &record("demo", "src/a.py", "python")).unwrap();
        assert!(get_file(&conn, "demo", "src/a.py").unwrap().is_some());

        let deleted = delete_files(&conn, "demo", &["src/a.py".to_string()]).unwrap();
        assert_eq!(deleted, 1);
        assert!(get_file(&conn, "demo", "src/a.py").unwrap().is_none());
        assert_eq!(count_files(&conn, "demo").unwrap(), 0);
    }

    #[test]
    fn delete_not_at_commit_drops_stale_and_unstamped_records() {
        let (_dir, conn) = setup_test_db();
        upsert_file(&conn, &record("demo", "src/current.py", "python")).unwrap();
        let mut stale = record("demo", "src/stale.py", "python");
        stale.commit = Some("b".repeat(40));
        upsert_file(&conn, &stale).unwrap();
        let mut unstamped = record("demo", "src/unstamped.py", "python");
        unstamped.commit = None;
        upsert_file(&conn, &unstamped).unwrap();
        let mut other_repo = record("other", "src/stale.py", "python");
        other_repo.commit = Some("b".repeat(40));
        upsert_file(&conn, &other_repo).unwrap();

        let removed = delete_not_at_commit(&conn, "demo", &"a".repeat(40)).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(count_files(&conn, "demo").unwrap(), 1);
        assert!(get_file(&conn, "demo", "src/current.py").unwrap().is_some());
        assert_eq!(count_files(&conn, "other").unwrap(), 1);
    }

    #[test]
    fn upsert_replaces_existing_record() {
        let (_dir, conn) = setup_test_db();
        upsert_file(&conn, &record("demo", "src/a.py", "python")).unwrap();
        let mut updated = record("demo", "src/a.py", "python");
        updated.functions = vec!["renamed".to_string()];
        upsert_file(&conn, &updated).unwrap();

        assert_eq!(count_files(&conn, "demo").unwrap(), 1);
        let stored = get_file(&conn, "demo", "src/a.py").unwrap().unwrap();
        assert_eq!(stored.functions, vec!["renamed".to_string()]);
    }

    #[test]
    fn path_search_treats_wildcards_literally() {
        let (_dir, conn) = setup_test_db();
        upsert_file(&conn, &record("demo", "src/a_b.py", "python")).unwrap();
        upsert_file(&conn, &record("demo", "src/axb.py", "python")).unwrap();

        let hits = search_by_path(&conn, "demo", "a_b", None, 10).unwrap();
        let paths: Vec<&str> = hits.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a_b.py"]);

        assert!(search_by_path(&conn, "demo", "%", None, 10).unwrap().is_empty());
    }

    #[test]
    fn path_search_ranks_exact_filename_first_and_filters_language() {
        let (_dir, conn) = setup_test_db();
        upsert_file(&conn, &record("demo", "docs/config.py.md", "markdown")).unwrap();
        upsert_file(&conn, &record("demo", "a/very/deep/config.py", "python")).unwrap();
        upsert_file(&conn, &record("demo", "src/config.pyi", "python")).unwrap();

        let hits = search_by_path(&conn, "demo", "config.py", None, 10).unwrap();
        assert_eq!(hits[0].path, "a/very/deep/config.py");

        let python_only = search_by_path(&conn, "demo", "config", Some("python"), 10).unwrap();
        assert_eq!(python_only.len(), 2);
    }

    #[test]
    fn symbol_search_returns_matching_names_only() {
        let (_dir, conn) = setup_test_db();
        upsert_file(&conn, &record("demo", "src/a.py", "python")).unwrap();
        upsert_file(&conn, &record("other", "src/a.py", "python")).unwrap();

        let hits = search_by_symbol(&conn, "demo", SymbolKind::Function, "CONFIG", None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].names, vec!["load_config".to_string()]);

        let classes = search_by_symbol(&conn, "demo", SymbolKind::Class, "loader", None, 10).unwrap();
        assert_eq!(classes[0].names, vec!["ConfigLoader".to_string()]);

        assert!(
            search_by_symbol(&conn, "demo", SymbolKind::Function, "_%", None, 10)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn language_histogram_counts_per_language() {
        let (_dir, conn) = setup_test_db();
        upsert_file(&conn, &record("demo", "a.py", "python")).unwrap();
        upsert_file(&conn, &record("demo", "b.py", "python")).unwrap();
        upsert_file(&conn, &record("demo", "c.go", "go")).unwrap();
        let histogram = language_histogram(&conn, "demo").unwrap();
        assert_eq!(
            histogram,
            vec![("python".to_string(), 2), ("go".to_string(), 1)]
        );
    }
}
