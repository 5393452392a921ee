//! Server Info Collector Library
//!
//! Accepts `(email, version)` reports from servers in the field and records
//! each distinct pair once.

pub mod bootstrap;
pub mod config;
pub mod report;
pub mod server;
pub mod storage;

pub use config::Config;
pub use report::Report;
pub use server::ReportServer;
pub use storage::{ReportStore, StorageError};
