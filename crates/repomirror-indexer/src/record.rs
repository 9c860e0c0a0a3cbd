use crate::languages::Extractor;
use repomirror_core::config::IndexConfig;
use repomirror_core::languages::detect_language_for_path;
use repomirror_core::time::now_iso8601;
use repomirror_core::types::IndexedFile;

/// Files kept searchable whatever their size.
const SIZE_EXEMPT_FILENAMES: &[&str] = &[
    "README",
    "README.md",
    "README.rst",
    "README.txt",
    "package.json",
    "Cargo.toml",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "requirements.txt",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "Gemfile",
    "Dockerfile",
    "Makefile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "tsconfig.json",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexLimits {
    pub max_file_size: u64,
    pub max_items_per_kind: usize,
    pub max_search_text_chars: usize,
}

impl Default for IndexLimits {
    fn default() -> Self {
        Self::from(&IndexConfig::default())
    }
}

impl From<&IndexConfig> for IndexLimits {
    fn from(config: &IndexConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            max_items_per_kind: config.max_items_per_kind,
            max_search_text_chars: config.max_search_text_chars,
        }
    }
}

pub fn filename_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn is_size_exempt(path: &str) -> bool {
    SIZE_EXEMPT_FILENAMES.contains(&filename_of(path))
}

/// Build the record for one file, or `None` when it is over the size ceiling
/// and not exempt.
pub fn build_record(
    repo: &str,
    path: &str,
    content: &str,
    commit: Option<&str>,
    limits: &IndexLimits,
) -> Option<IndexedFile> {
    let size_bytes = content.len() as u64;
    if size_bytes > limits.max_file_size && !is_size_exempt(path) {
        return None;
    }

    let language = detect_language_for_path(path);
    let symbols = Extractor::for_language(language).extract(content, limits.max_items_per_kind);
    let line_count = if content.is_empty() {
        0
    } else {
        content.lines().count() as u64
    };
    let search_text = build_search_text(
        path,
        &[&symbols.imports, &symbols.functions, &symbols.classes],
        limits.max_search_text_chars,
    );

    Some(IndexedFile {
        repo: repo.to_string(),
        path: path.to_string(),
        filename: filename_of(path).to_string(),
        language: language.map(str::to_string),
        size_bytes,
        line_count,
        commit: commit.map(str::to_string),
        imports: symbols.imports,
        functions: symbols.functions,
        classes: symbols.classes,
        search_text,
        indexed_at: now_iso8601(),
    })
}

/// Path, its components, then every extracted name, space-joined and capped.
pub fn build_search_text(path: &str, groups: &[&Vec<String>], max_chars: usize) -> String {
    let mut terms: Vec<&str> = vec![path];
    terms.extend(
        path.split(['/', '.', '_', '-'])
            .filter(|part| !part.is_empty()),
    );
    for group in groups {
        terms.extend(group.iter().map(String::as_str));
    }
    let joined = terms.join(" ");
    match joined.char_indices().nth(max_chars) {
        Some((cut, _)) => joined[..cut].to_string(),
        None => joined,
    }
}
