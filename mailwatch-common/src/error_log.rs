//! Append-only error log.
//!
//! Every entry is a single UTF-8 line of the form `<timestamp>: <message>`,
//! where the timestamp uses the classic `ctime` layout
//! (`Thu Oct 16 09:41:07 2026`). Failing to write an entry is never an error
//! for the caller: the failure is reported on the diagnostic stream and
//! otherwise swallowed.

use std::{
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

/// Default location of the error log, relative to the working directory.
pub const DEFAULT_ERROR_LOG: &str = "error_log.txt";

const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG)
    }
}

impl ErrorLog {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry stamped with the current local time.
    pub async fn append(&self, message: &str) {
        self.append_at(Local::now(), message).await;
    }

    /// Append one entry with an explicit timestamp.
    pub async fn append_at(&self, at: DateTime<Local>, message: &str) {
        if let Err(err) = self.try_append(at, message).await {
            tracing::error!(
                path = %self.path.display(),
                error = %err,
                "Failed to write to error log: {message}"
            );
        }
    }

    async fn try_append(&self, at: DateTime<Local>, message: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(format_entry(at, message).as_bytes()).await?;
        file.flush().await
    }
}

/// Render a single log line, newline included.
///
/// Embedded line breaks are folded into spaces so one entry is always one
/// line.
#[must_use]
pub fn format_entry(at: DateTime<Local>, message: &str) -> String {
    let message = message.replace("\r\n", " ").replace(['\r', '\n'], " ");
    format!("{}: {message}\n", at.format(TIMESTAMP_FORMAT))
}
