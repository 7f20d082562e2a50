//! Pieces shared by every mailwatch crate: configuration types, the tracing
//! setup and the append-only error log.

pub mod config;
pub mod error_log;
pub mod logging;

pub use tracing;

/// Subject line used for every message of a batch.
pub const SUBJECT: &str = "Automatic Email";
