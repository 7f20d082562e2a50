//! Watches a recipient list and mails every address on it whenever it changes.
//!
//! - [`config`]: locating and loading `mailwatch.config.ron`
//! - [`controller`]: the single-batch driver behind the CLI
//! - [`surface`]: where status lines and error notifications go

pub mod config;
pub mod controller;
pub mod surface;
