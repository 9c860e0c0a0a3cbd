pub mod db;
pub mod files;
pub mod repositories;
pub mod retry;
pub mod schema;
pub mod sync_jobs;
