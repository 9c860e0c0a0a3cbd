use rayon::prelude::*;
use repomirror_vcs::Mirror;

/// Files read per parallel batch; bounds how much content is held at once.
pub const READ_BATCH_SIZE: usize = 256;

/// Read `paths` at `revision` in parallel. `None` marks an unreadable file.
pub fn read_batch(mirror: &Mirror, paths: &[String], revision: &str) -> Vec<(String, Option<String>)> {
    paths
        .par_iter()
        .map(|path| (path.clone(), mirror.read_file(path, revision)))
        .collect()
}
