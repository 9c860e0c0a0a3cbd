use crate::store::Mirror;
use crate::validate::{validate_path, validate_ref};
use ignore::WalkBuilder;
use repomirror_core::error::VcsError;
use tracing::debug;

impl Mirror {
    /// Every blob path in the tree at `reference`. Submodule entries are skipped.
    pub fn list_files(&self, reference: &str) -> Result<Vec<String>, VcsError> {
        validate_ref(reference)?;
        let output = self.git(&["ls-tree", "-r", "-z", "--full-tree", reference])?;
        let mut files = Vec::new();
        for record in output.stdout.split(|byte| *byte == 0) {
            if record.is_empty() {
                continue;
            }
            let record = String::from_utf8_lossy(record);
            // "<mode> <type> <oid>\t<path>"
            let Some((meta, path)) = record.split_once('\t') else {
                return Err(VcsError::Parse(format!("ls-tree record: {record}")));
            };
            if meta.split(' ').nth(1) == Some("blob") {
                files.push(path.to_string());
            }
        }
        Ok(files)
    }

    /// Text of `path` at `reference`, or `None` when the input is invalid or the
    /// blob can't be read. Invalid input never reaches a subprocess.
    pub fn read_file(&self, path: &str, reference: &str) -> Option<String> {
        if validate_path(path).is_err() || validate_ref(reference).is_err() {
            debug!(repo = self.name(), path, "Rejected file read with invalid path or ref");
            return None;
        }
        let object = format!("{reference}:{path}");
        let output = match self.git_unchecked(&["cat-file", "blob", &object]) {
            Ok(output) => output,
            Err(err) => {
                debug!(repo = self.name(), path, error = %err, "File read failed");
                return None;
            }
        };
        if !output.status.success() || output.truncated {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Number of commits reachable from `reference`.
    pub fn commit_count(&self, reference: &str) -> Result<u64, VcsError> {
        validate_ref(reference)?;
        let output = self.git(&["rev-list", "--count", reference, "--"])?;
        let raw = output.stdout_lossy();
        raw.trim()
            .parse()
            .map_err(|_| VcsError::Parse(format!("rev-list count: {}", raw.trim())))
    }

    /// Bytes the mirror occupies on disk.
    pub fn disk_size(&self) -> u64 {
        WalkBuilder::new(self.path())
            .standard_filters(false)
            .hidden(false)
            .follow_links(false)
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_file()))
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum()
    }
}
