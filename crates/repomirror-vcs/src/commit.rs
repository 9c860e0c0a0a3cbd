use crate::diff::{NameStatus, parse_name_status};
use crate::store::Mirror;
use crate::validate::validate_ref;
use repomirror_core::error::VcsError;
use serde::Serialize;

/// Header fields separated by NUL so no printable character in a name or
/// subject can be taken for a field boundary.
const HEADER_FORMAT: &str = "--format=%H%x00%h%x00%P%x00%an%x00%ae%x00%aI%x00%B";
const HEADER_FIELDS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

impl FileChangeStatus {
    fn from_letter(letter: char) -> Self {
        match letter {
            'A' => Self::Added,
            'D' => Self::Deleted,
            'R' => Self::Renamed,
            'C' => Self::Copied,
            _ => Self::Modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitFile {
    pub path: String,
    pub status: FileChangeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitHeader {
    pub id: String,
    pub short_id: String,
    pub parents: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    /// Strict ISO 8601 author date.
    pub date: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    #[serde(flatten)]
    pub header: CommitHeader,
    pub files: Vec<CommitFile>,
    pub total_files: usize,
    pub offset: usize,
    pub truncated: bool,
}

/// Parse the NUL-delimited output of [`HEADER_FORMAT`].
pub fn parse_commit_header(raw: &str) -> Result<CommitHeader, VcsError> {
    let fields: Vec<&str> = raw.splitn(HEADER_FIELDS, '\0').collect();
    if fields.len() != HEADER_FIELDS {
        return Err(VcsError::Parse(format!(
            "commit header has {} fields, expected {HEADER_FIELDS}",
            fields.len()
        )));
    }
    let id = fields[0].trim();
    if id.is_empty() {
        return Err(VcsError::Parse("commit header without id".to_string()));
    }
    Ok(CommitHeader {
        id: id.to_string(),
        short_id: fields[1].to_string(),
        parents: fields[2].split_whitespace().map(str::to_string).collect(),
        author_name: fields[3].to_string(),
        author_email: fields[4].to_string(),
        date: fields[5].to_string(),
        message: fields[6].trim_end().to_string(),
    })
}

fn to_commit_file(entry: NameStatus) -> CommitFile {
    CommitFile {
        status: FileChangeStatus::from_letter(entry.status),
        path: entry.path,
        old_path: entry.old_path,
    }
}

impl Mirror {
    pub fn commit_header(&self, reference: &str) -> Result<CommitHeader, VcsError> {
        validate_ref(reference)?;
        let output = self.git(&["show", "-s", "--no-color", HEADER_FORMAT, reference, "--"])?;
        parse_commit_header(&output.stdout_lossy())
    }

    /// Commit metadata plus one page of its changed files, diffed against the
    /// first parent (or the empty tree for a root commit).
    pub fn commit_info(
        &self,
        reference: &str,
        offset: usize,
        limit: usize,
    ) -> Result<CommitInfo, VcsError> {
        let header = self.commit_header(reference)?;
        let output = match header.parents.first() {
            Some(parent) => self.git(&[
                "diff",
                "--name-status",
                "-M",
                "-C",
                "-z",
                "--no-ext-diff",
                parent,
                &header.id,
                "--",
            ])?,
            None => self.git(&[
                "diff-tree",
                "-r",
                "--root",
                "--no-commit-id",
                "--name-status",
                "-M",
                "-C",
                "-z",
                &header.id,
                "--",
            ])?,
        };
        let all_files = parse_name_status(&output.stdout)?;
        let total_files = all_files.len();
        let files: Vec<CommitFile> = all_files
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(to_commit_file)
            .collect();
        let truncated = offset.saturating_add(files.len()) < total_files;
        Ok(CommitInfo {
            header,
            files,
            total_files,
            offset,
            truncated,
        })
    }
}
