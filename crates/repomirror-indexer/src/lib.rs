pub mod filter;
pub mod import;
pub mod job;
pub mod languages;
pub mod reader;
pub mod record;
pub mod sync_incremental;
pub mod writer;

pub use filter::should_index;
pub use record::IndexLimits;
