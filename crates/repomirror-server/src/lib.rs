pub mod http;
pub mod worker;

pub use worker::SyncSupervisor;
