//! Configuration types for mailwatch.
//!
//! ## Modules
//!
//! - [`form`]: the operator's form (body and SMTP credentials) and its validation
//! - [`timings`]: operation timeout, inter-send delay and poll interval
//! - [`tls`]: STARTTLS policy and certificate validation settings

pub mod form;
pub mod timings;
pub mod tls;

use std::path::PathBuf;

use serde::Deserialize;

pub use form::{Form, SmtpParameters, ValidatedForm, ValidationError};
pub use timings::Timings;
pub use tls::{TlsCertificatePolicy, TlsConfig, TlsPolicy};

use crate::error_log::DEFAULT_ERROR_LOG;

/// Default recipient source, relative to the working directory.
pub const DEFAULT_SOURCE: &str = "email_list.csv";

/// Name sent with EHLO when none is configured.
pub const DEFAULT_HELO_NAME: &str = "localhost";

/// Top-level configuration, as read from `mailwatch.config.ron`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Current state of the operator's form.
    #[serde(default)]
    pub form: Form,

    /// The recipient source being watched.
    #[serde(default = "default_source")]
    pub source: PathBuf,

    /// Where per-recipient and batch-fatal errors are appended.
    #[serde(default = "default_error_log")]
    pub error_log: PathBuf,

    /// Name announced in EHLO.
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    #[serde(default)]
    pub timings: Timings,

    #[serde(default)]
    pub tls: TlsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            form: Form::default(),
            source: default_source(),
            error_log: default_error_log(),
            helo_name: default_helo_name(),
            timings: Timings::default(),
            tls: TlsConfig::default(),
        }
    }
}

fn default_source() -> PathBuf {
    PathBuf::from(DEFAULT_SOURCE)
}

fn default_error_log() -> PathBuf {
    PathBuf::from(DEFAULT_ERROR_LOG)
}

fn default_helo_name() -> String {
    DEFAULT_HELO_NAME.to_string()
}
