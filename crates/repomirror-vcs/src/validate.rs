//! Input checks applied before any value reaches a git command line.
//!
//! Values that fail are rejected outright; nothing is partially cleaned and then used.

use repomirror_core::error::VcsError;

/// Repository-relative path: non-empty, no NUL, no backslash, no leading `-`,
/// and no empty, `.` or `..` segments.
pub fn validate_path(path: &str) -> Result<(), VcsError> {
    if path.is_empty() {
        return Err(VcsError::invalid_input("path", "must not be empty"));
    }
    if path.contains('\0') {
        return Err(VcsError::invalid_input("path", "contains NUL byte"));
    }
    if path.contains('\\') {
        return Err(VcsError::invalid_input("path", "contains backslash"));
    }
    if path.starts_with('-') {
        return Err(VcsError::invalid_input("path", "must not start with '-'"));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(VcsError::invalid_input(
            "path",
            "contains empty, '.' or '..' segment",
        ));
    }
    Ok(())
}

/// Revision expression: non-empty, no NUL, no leading `-`, no whitespace.
pub fn validate_ref(reference: &str) -> Result<(), VcsError> {
    if reference.is_empty() {
        return Err(VcsError::invalid_input("ref", "must not be empty"));
    }
    if reference.contains('\0') {
        return Err(VcsError::invalid_input("ref", "contains NUL byte"));
    }
    if reference.starts_with('-') {
        return Err(VcsError::invalid_input("ref", "must not start with '-'"));
    }
    if reference.chars().any(char::is_whitespace) {
        return Err(VcsError::invalid_input("ref", "contains whitespace"));
    }
    Ok(())
}

/// Repository name, used verbatim as a directory under the mirror root.
pub fn validate_repo_name(name: &str) -> Result<(), VcsError> {
    if name.is_empty() || name.len() > 200 {
        return Err(VcsError::invalid_input(
            "repo",
            "must be between 1 and 200 characters",
        ));
    }
    if name.starts_with(['-', '.']) {
        return Err(VcsError::invalid_input(
            "repo",
            "must not start with '-' or '.'",
        ));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    {
        return Err(VcsError::invalid_input(
            "repo",
            "only ASCII letters, digits, '-', '_' and '.' are allowed",
        ));
    }
    Ok(())
}

/// Upstream url or local path handed to `git clone`.
pub fn validate_url(url: &str) -> Result<(), VcsError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(VcsError::invalid_input("url", "must not be empty"));
    }
    if trimmed.starts_with('-') {
        return Err(VcsError::invalid_input("url", "must not start with '-'"));
    }
    if trimmed.contains('\0') || trimmed.chars().any(char::is_whitespace) {
        return Err(VcsError::invalid_input(
            "url",
            "contains NUL byte or whitespace",
        ));
    }
    if trimmed.to_ascii_lowercase().starts_with("ext::") {
        return Err(VcsError::invalid_input("url", "ext:: transport is not allowed"));
    }
    Ok(())
}
