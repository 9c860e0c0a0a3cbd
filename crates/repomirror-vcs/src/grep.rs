use crate::store::Mirror;
use crate::validate::validate_ref;
use repomirror_core::constants::PREFERRED_BRANCHES;
use repomirror_core::error::VcsError;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest line text kept per match.
const MAX_LINE_CHARS: usize = 500;

const REGEX_METACHARACTERS: &[char] = &[
    '.', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|', '^', '$', '\\',
];

#[derive(Debug, Clone)]
pub struct GrepQuery<'a> {
    pub query: &'a str,
    pub file_glob: Option<&'a str>,
    pub case_sensitive: bool,
    pub reference: &'a str,
    pub max_results: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrepMatch {
    pub path: String,
    pub line_number: u64,
    pub line: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GrepResult {
    pub matches: Vec<GrepMatch>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternMode {
    Fixed,
    Extended,
}

impl PatternMode {
    fn for_query(query: &str) -> Self {
        if query.contains(REGEX_METACHARACTERS) {
            Self::Extended
        } else {
            Self::Fixed
        }
    }

    fn flag(self) -> &'static str {
        match self {
            Self::Fixed => "-F",
            Self::Extended => "-E",
        }
    }
}

pub fn validate_query(query: &str) -> Result<(), VcsError> {
    if query.is_empty() {
        return Err(VcsError::invalid_input("query", "must not be empty"));
    }
    if query.contains(['\0', '\n', '\r']) {
        return Err(VcsError::invalid_input("query", "contains NUL or newline"));
    }
    Ok(())
}

pub fn validate_glob(glob: &str) -> Result<(), VcsError> {
    if glob.is_empty() || glob.starts_with('-') || glob.starts_with(':') || glob.contains('\0') {
        return Err(VcsError::invalid_input(
            "glob",
            "must be non-empty and not start with '-' or ':'",
        ));
    }
    if glob.split('/').any(|segment| segment == "..") {
        return Err(VcsError::invalid_input("glob", "contains '..' segment"));
    }
    Ok(())
}

impl Mirror {
    /// `git grep` over the tree at `query.reference`.
    ///
    /// Literal matching unless the query has regex metacharacters; an invalid
    /// regex is retried as a literal. No matches is an empty result, not an error.
    pub fn grep(&self, query: &GrepQuery<'_>, timeout: Duration) -> Result<GrepResult, VcsError> {
        validate_query(query.query)?;
        validate_ref(query.reference)?;
        if let Some(glob) = query.file_glob {
            validate_glob(glob)?;
        }

        let mode = PatternMode::for_query(query.query);
        match self.grep_with_mode(query, mode, timeout) {
            Err(VcsError::CommandFailed { stderr, .. })
                if mode == PatternMode::Extended && looks_like_regex_error(&stderr) =>
            {
                debug!(repo = self.name(), "Invalid regex; retrying as literal");
                self.grep_with_mode(query, PatternMode::Fixed, timeout)
            }
            other => other,
        }
    }

    fn grep_with_mode(
        &self,
        query: &GrepQuery<'_>,
        mode: PatternMode,
        timeout: Duration,
    ) -> Result<GrepResult, VcsError> {
        let pathspec = query
            .file_glob
            .map(|glob| format!(":(glob){}", anchored_glob(glob)));
        let mut args = vec!["grep", "-I", "-n", "-z", "--full-name", "--no-color", mode.flag()];
        if !query.case_sensitive {
            args.push("-i");
        }
        // -e keeps a leading '-' in the query from being read as a flag.
        args.extend(["-e", query.query, query.reference, "--"]);
        if let Some(pathspec) = &pathspec {
            args.push(pathspec);
        }

        // One line past the cap is enough to know the result was truncated.
        let output = self.runner().run_with_line_limit(
            Some(self.path()),
            &args,
            timeout,
            query.max_results.saturating_add(1),
        )?;
        match output.status.code() {
            Some(0) => {}
            Some(1) => return Ok(GrepResult::default()),
            // git stops on a broken pipe once enough lines were read.
            _ if output.truncated => {}
            _ => return Err(self.runner().failure(&args, &output)),
        }

        let mut result = GrepResult {
            truncated: output.truncated,
            ..GrepResult::default()
        };
        for line in output.stdout.split(|byte| *byte == b'\n') {
            if line.is_empty() {
                continue;
            }
            if result.matches.len() >= query.max_results {
                result.truncated = true;
                break;
            }
            match parse_grep_line(line, query.reference) {
                Some(found) => result.matches.push(found),
                None => warn!(repo = self.name(), "Skipping unparseable grep line"),
            }
        }
        Ok(result)
    }
}

/// A bare `*.py` should match at any depth.
fn anchored_glob(glob: &str) -> String {
    if glob.contains('/') || glob.starts_with("**") {
        glob.to_string()
    } else {
        format!("**/{glob}")
    }
}

fn looks_like_regex_error(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    ["regex", "unmatched", "invalid", "parentheses", "brace", "repetition"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Parse `<name>\0<line>\0<text>` where `<name>` may carry a `ref:` prefix.
fn parse_grep_line(line: &[u8], reference: &str) -> Option<GrepMatch> {
    let mut parts = line.splitn(3, |byte| *byte == 0);
    let name = String::from_utf8_lossy(parts.next()?).into_owned();
    let line_number = std::str::from_utf8(parts.next()?).ok()?.parse().ok()?;
    let text = String::from_utf8_lossy(parts.next().unwrap_or_default());
    Some(GrepMatch {
        path: strip_ref_prefix(&name, reference),
        line_number,
        line: text.chars().take(MAX_LINE_CHARS).collect(),
    })
}

/// Strip a leading `ref:` from a grep file name.
///
/// The exact ref searched is stripped when present. Otherwise the text before the
/// first `:` is only treated as a ref if it looks like one: it contains `/`, is a
/// well-known branch name or `HEAD`, or is a plausible hex revision id.
pub fn strip_ref_prefix(name: &str, reference: &str) -> String {
    if let Some(rest) = name
        .strip_prefix(reference)
        .and_then(|rest| rest.strip_prefix(':'))
        && !rest.is_empty()
    {
        return rest.to_string();
    }
    match name.split_once(':') {
        Some((prefix, rest)) if !rest.is_empty() && looks_like_ref(prefix) => rest.to_string(),
        _ => name.to_string(),
    }
}

fn looks_like_ref(prefix: &str) -> bool {
    prefix.contains('/')
        || prefix == "HEAD"
        || PREFERRED_BRANCHES.contains(&prefix)
        || ((7..=64).contains(&prefix.len()) && prefix.bytes().all(|b| b.is_ascii_hexdigit()))
}
