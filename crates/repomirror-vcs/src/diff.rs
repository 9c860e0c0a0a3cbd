use crate::store::Mirror;
use crate::validate::validate_ref;
use repomirror_core::error::VcsError;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub old_path: String,
    pub new_path: String,
}

/// Files changed between two revisions, as four disjoint groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    pub renamed: Vec<Rename>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.removed.is_empty()
            && self.renamed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len() + self.renamed.len()
    }
}

/// One entry of `--name-status -z` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameStatus {
    /// First letter of the status field: A, M, D, R, C, T, U or X.
    pub status: char,
    pub path: String,
    /// Source path for renames and copies.
    pub old_path: Option<String>,
}

/// Parse NUL-separated `--name-status -z` output.
pub fn parse_name_status(raw: &[u8]) -> Result<Vec<NameStatus>, VcsError> {
    let mut fields = raw
        .split(|byte| *byte == 0)
        .map(|field| String::from_utf8_lossy(field).into_owned());
    let mut entries = Vec::new();
    while let Some(status_field) = fields.next() {
        let status_field = status_field.trim_start_matches('\n');
        let Some(status) = status_field.chars().next() else {
            continue;
        };
        let mut next_path = || {
            fields
                .next()
                .filter(|path| !path.is_empty())
                .ok_or_else(|| VcsError::Parse(format!("missing path after status {status_field}")))
        };
        let entry = if matches!(status, 'R' | 'C') {
            let old_path = next_path()?;
            let path = next_path()?;
            NameStatus {
                status,
                path,
                old_path: Some(old_path),
            }
        } else {
            NameStatus {
                status,
                path: next_path()?,
                old_path: None,
            }
        };
        entries.push(entry);
    }
    Ok(entries)
}

/// Sort entries into a disjoint [`ChangeSet`]. A path both removed and added
/// (type change split into two entries) counts as modified.
pub fn change_set_from(entries: Vec<NameStatus>) -> ChangeSet {
    let mut added = BTreeSet::new();
    let mut modified = BTreeSet::new();
    let mut removed = BTreeSet::new();
    let mut renamed = Vec::new();

    for entry in entries {
        match (entry.status, entry.old_path) {
            ('R', Some(old_path)) => renamed.push(Rename {
                old_path,
                new_path: entry.path,
            }),
            ('A' | 'C', _) => {
                added.insert(entry.path);
            }
            ('D', _) => {
                removed.insert(entry.path);
            }
            _ => {
                modified.insert(entry.path);
            }
        }
    }

    let both: Vec<String> = added.intersection(&removed).cloned().collect();
    for path in both {
        added.remove(&path);
        removed.remove(&path);
        modified.insert(path);
    }
    for path in &modified {
        added.remove(path);
        removed.remove(path);
    }

    ChangeSet {
        added: added.into_iter().collect(),
        modified: modified.into_iter().collect(),
        removed: removed.into_iter().collect(),
        renamed,
    }
}

impl Mirror {
    /// Changes from `old_rev` to `new_rev` with rename detection.
    pub fn changed_files(&self, old_rev: &str, new_rev: &str) -> Result<ChangeSet, VcsError> {
        validate_ref(old_rev)?;
        validate_ref(new_rev)?;
        let output = self.git(&[
            "diff",
            "--name-status",
            "-M",
            "-z",
            "--no-ext-diff",
            old_rev,
            new_rev,
            "--",
        ])?;
        Ok(change_set_from(parse_name_status(&output.stdout)?))
    }
}
