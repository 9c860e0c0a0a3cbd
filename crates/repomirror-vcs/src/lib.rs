//! Local bare mirrors of upstream repositories, driven through the `git` binary.
//!
//! All subprocess output passes through [`sanitize::sanitize_credentials`] before
//! it is logged or returned, and every path/ref is validated before it reaches a
//! command line.

pub mod command;
pub mod commit;
pub mod diff;
pub mod grep;
pub mod refs;
pub mod sanitize;
pub mod store;
pub mod tree;
pub mod validate;

pub use store::{Mirror, MirrorOutcome, MirrorStore};
