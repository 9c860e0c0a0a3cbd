pub mod commit;
pub mod jobs;
pub mod refs;
pub mod search;
pub mod stats;
