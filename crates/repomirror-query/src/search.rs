use crate::refs::{EffectiveRef, effective_ref, open_mirror, repository};
use repomirror_core::config::SearchConfig;
use repomirror_core::error::QueryError;
use repomirror_core::languages::detect_language_for_path;
use repomirror_core::types::IndexedFile;
use repomirror_state::files::{self, SymbolKind};
use repomirror_vcs::grep::{GrepMatch, GrepQuery};
use repomirror_vcs::{Mirror, MirrorStore};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Content,
    Filename,
    Function,
    Class,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Filename => "filename",
            Self::Function => "function",
            Self::Class => "class",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "content" | "code" => Some(Self::Content),
            "filename" | "file" | "path" => Some(Self::Filename),
            "function" | "func" | "fn" => Some(Self::Function),
            "class" | "type" => Some(Self::Class),
            _ => None,
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchRequest<'a> {
    pub repo: &'a str,
    pub query: &'a str,
    pub mode: SearchMode,
    /// Content mode only.
    pub file_glob: Option<&'a str>,
    pub language: Option<&'a str>,
    pub case_sensitive: bool,
    pub reference: Option<&'a str>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    pub language: Option<String>,
    pub size_bytes: Option<u64>,
    /// Matched function or class names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub repo: String,
    pub mode: SearchMode,
    #[serde(rename = "ref")]
    pub reference: EffectiveRef,
    pub results: Vec<SearchHit>,
    pub total: usize,
    pub truncated: bool,
    /// Filename results came from a raw tree listing because nothing is indexed.
    pub from_listing: bool,
}

/// Run one query against a repository's mirror and index.
pub fn search(
    conn: &Connection,
    store: &MirrorStore,
    config: &SearchConfig,
    request: &SearchRequest<'_>,
) -> Result<SearchResponse, QueryError> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(QueryError::invalid_input("query", "must not be empty"));
    }
    let limit = config.effective_limit(request.limit);
    let language = request.language.map(str::trim).filter(|l| !l.is_empty());

    let metadata = repository(conn, request.repo)?;
    let mirror = open_mirror(store, request.repo)?;
    let reference = effective_ref(metadata.as_ref(), &mirror, request.reference)?;
    let started = Instant::now();

    let mut from_listing = false;
    let (results, truncated) = match request.mode {
        SearchMode::Content => content_search(
            conn,
            &mirror,
            request,
            query,
            language,
            &reference.reference,
            limit,
            Duration::from_secs(config.grep_timeout_secs.max(1)),
        )?,
        SearchMode::Filename => {
            if files::count_files(conn, request.repo)? > 0 {
                indexed_path_search(conn, request.repo, query, language, limit)?
            } else {
                from_listing = true;
                listing_path_search(&mirror, &reference.reference, query, language, limit)?
            }
        }
        SearchMode::Function => symbol_search(conn, request.repo, SymbolKind::Function, query, language, limit)?,
        SearchMode::Class => symbol_search(conn, request.repo, SymbolKind::Class, query, language, limit)?,
    };

    info!(
        repo = request.repo,
        mode = request.mode.as_str(),
        reference = %reference.reference,
        results = results.len(),
        truncated,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Search complete"
    );
    Ok(SearchResponse {
        repo: request.repo.to_string(),
        mode: request.mode,
        reference,
        total: results.len(),
        results,
        truncated,
        from_listing,
    })
}

/// Most grep matches examined to fill a language-filtered page.
const LANGUAGE_SCAN_LIMIT: usize = 20_000;

#[allow(clippy::too_many_arguments)]
fn content_search(
    conn: &Connection,
    mirror: &Mirror,
    request: &SearchRequest<'_>,
    query: &str,
    language: Option<&str>,
    reference: &str,
    limit: usize,
    timeout: Duration,
) -> Result<(Vec<SearchHit>, bool), QueryError> {
    let file_glob = request.file_glob.map(str::trim).filter(|g| !g.is_empty());
    // The language filter runs after grep, so a filtered page may need a wider scan.
    let mut max_results = limit;
    loop {
        let grep = mirror.grep(
            &GrepQuery {
                query,
                file_glob,
                case_sensitive: request.case_sensitive,
                reference,
                max_results,
            },
            timeout,
        )?;
        let scanned = grep.matches.len();
        let mut hits = enrich_matches(conn, request.repo, grep.matches, language)?;

        let widen = language.is_some()
            && grep.truncated
            && hits.len() <= limit
            && max_results < LANGUAGE_SCAN_LIMIT;
        if widen {
            debug!(
                repo = request.repo,
                scanned,
                kept = hits.len(),
                "Language filter left the page short; widening grep"
            );
            max_results = max_results.saturating_mul(4).clamp(1, LANGUAGE_SCAN_LIMIT);
            continue;
        }

        let truncated = grep.truncated || hits.len() > limit;
        hits.truncate(limit);
        return Ok((hits, truncated));
    }
}

/// Attach index metadata to grep matches, dropping those in other languages.
fn enrich_matches(
    conn: &Connection,
    repo: &str,
    matches: Vec<GrepMatch>,
    language: Option<&str>,
) -> Result<Vec<SearchHit>, QueryError> {
    let paths: Vec<&str> = matches.iter().map(|m| m.path.as_str()).collect();
    let indexed = files::get_files_by_paths(conn, repo, &paths)?;
    debug!(
        repo,
        matches = matches.len(),
        enriched = indexed.len(),
        "Enriching content matches"
    );

    Ok(matches
        .into_iter()
        .filter_map(|found| {
            let record = indexed.get(&found.path);
            let hit_language = record
                .and_then(|file| file.language.clone())
                .or_else(|| detect_language_for_path(&found.path).map(str::to_string));
            if let Some(wanted) = language
                && hit_language.as_deref() != Some(wanted)
            {
                return None;
            }
            Some(SearchHit {
                size_bytes: record.map(|file| file.size_bytes),
                language: hit_language,
                line_number: Some(found.line_number),
                line: Some(found.line),
                path: found.path,
                names: Vec::new(),
            })
        })
        .collect())
}

fn file_hit(file: IndexedFile, names: Vec<String>) -> SearchHit {
    SearchHit {
        path: file.path,
        line_number: None,
        line: None,
        language: file.language,
        size_bytes: Some(file.size_bytes),
        names,
    }
}

fn indexed_path_search(
    conn: &Connection,
    repo: &str,
    query: &str,
    language: Option<&str>,
    limit: usize,
) -> Result<(Vec<SearchHit>, bool), QueryError> {
    let mut found = files::search_by_path(conn, repo, query, language, limit + 1)?;
    let truncated = found.len() > limit;
    found.truncate(limit);
    Ok((
        found.into_iter().map(|file| file_hit(file, Vec::new())).collect(),
        truncated,
    ))
}

/// Substring match over the raw tree listing, exact filenames first.
fn listing_path_search(
    mirror: &Mirror,
    reference: &str,
    query: &str,
    language: Option<&str>,
    limit: usize,
) -> Result<(Vec<SearchHit>, bool), QueryError> {
    let needle = query.to_lowercase();
    let mut ranked: Vec<(u8, String)> = mirror
        .list_files(reference)?
        .into_iter()
        .filter(|path| path.to_lowercase().contains(&needle))
        .filter(|path| language.is_none_or(|wanted| detect_language_for_path(path) == Some(wanted)))
        .map(|path| {
            let filename = path.rsplit('/').next().unwrap_or(&path).to_lowercase();
            let rank = if filename == needle {
                0
            } else if filename.contains(&needle) {
                1
            } else {
                2
            };
            (rank, path)
        })
        .collect();
    ranked.sort_by(|(rank_a, a), (rank_b, b)| {
        rank_a.cmp(rank_b).then(a.len().cmp(&b.len())).then(a.cmp(b))
    });

    let truncated = ranked.len() > limit;
    let hits = ranked
        .into_iter()
        .take(limit)
        .map(|(_, path)| SearchHit {
            language: detect_language_for_path(&path).map(str::to_string),
            path,
            line_number: None,
            line: None,
            size_bytes: None,
            names: Vec::new(),
        })
        .collect();
    Ok((hits, truncated))
}

fn symbol_search(
    conn: &Connection,
    repo: &str,
    kind: SymbolKind,
    query: &str,
    language: Option<&str>,
    limit: usize,
) -> Result<(Vec<SearchHit>, bool), QueryError> {
    if files::count_files(conn, repo)? == 0 {
        return Err(QueryError::NotIndexed {
            repo: repo.to_string(),
        });
    }
    let mut found = files::search_by_symbol(conn, repo, kind, query, language, limit + 1)?;
    let truncated = found.len() > limit;
    found.truncate(limit);
    Ok((
        found
            .into_iter()
            .map(|matched| file_hit(matched.file, matched.names))
            .collect(),
        truncated,
    ))
}
