//! Two levels of failure.
//!
//! - [`BatchFatalError`]: the batch cannot go on; handled once, at the batch
//!   boundary, by whoever started it
//! - [`RecipientError`]: one recipient was skipped or could not be sent to;
//!   recorded in the report and the batch carries on

use std::{path::PathBuf, time::Duration};

use mailwatch_common::config::ValidationError;
use mailwatch_smtp::client::ClientError;
use thiserror::Error;

use crate::{recipient::Recipient, source::SourceError};

#[derive(Debug, Error)]
pub enum BatchFatalError {
    #[error("File Error: CSV file '{}' not found.", .0.display())]
    SourceNotFound(PathBuf),

    #[error(
        "Encoding Error: Unable to read the CSV file. Try saving it as UTF-8. Error: {0}"
    )]
    Encoding(#[source] SourceError),

    #[error("File Error: {0}")]
    SourceUnreadable(#[source] SourceError),

    #[error(
        "Network Error: Unable to connect to the SMTP server. Check your internet connection and server address. ({0})"
    )]
    Unreachable(#[source] ClientError),

    #[error("Timeout Error: The connection to the SMTP server timed out after {0:?}.")]
    Timeout(Duration),

    #[error("SMTP Authentication Error: Invalid username or password. ({0})")]
    Authentication(String),

    #[error("SMTP Error: {0}")]
    Smtp(String),

    /// The form was not usable when a scheduled batch came due.
    #[error("Configuration Error: {0}")]
    InvalidForm(#[from] ValidationError),
}

impl BatchFatalError {
    #[must_use]
    pub const fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    #[must_use]
    pub const fn is_source_not_found(&self) -> bool {
        matches!(self, Self::SourceNotFound(_))
    }
}

impl From<SourceError> for BatchFatalError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::NotFound(path) => Self::SourceNotFound(path),
            error @ SourceError::Encoding { .. } => Self::Encoding(error),
            error @ SourceError::Io { .. } => Self::SourceUnreadable(error),
        }
    }
}

/// Classifies a client failure during session setup.
///
/// Resolution and connect failures are network errors, timeouts keep their
/// own category, and anything else is a generic SMTP failure.
impl From<ClientError> for BatchFatalError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Timeout(after) => Self::Timeout(after),
            error if error.is_unreachable() => Self::Unreachable(error),
            error => Self::Smtp(error.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecipientError {
    #[error("Invalid email address: {}", address.escape_debug())]
    InvalidAddress { address: String, row: usize },

    #[error("Failed to send email to {recipient}: {source}")]
    SendFailed {
        recipient: Recipient,
        #[source]
        source: ClientError,
    },
}

impl RecipientError {
    /// Whether a send was actually attempted for this recipient.
    #[must_use]
    pub const fn was_attempted(&self) -> bool {
        matches!(self, Self::SendFailed { .. })
    }
}
