//! Fixed pacing of the mailer.
//!
//! The three values below are constants of the program; they are exposed as
//! configuration only so they can be shortened for testing.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout for connecting to the SMTP server and for every read or write on
/// the session.
pub const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after each send attempt, to stay under server-side rate limits.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_secs(1);

/// Interval between two checks of the recipient source's modification time.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    /// Default: 10 seconds
    #[serde(default = "defaults::smtp_timeout_millis")]
    pub smtp_timeout_millis: u64,

    /// Default: 1 second
    #[serde(default = "defaults::send_delay_millis")]
    pub send_delay_millis: u64,

    /// Default: 5 seconds
    #[serde(default = "defaults::poll_interval_millis")]
    pub poll_interval_millis: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            smtp_timeout_millis: defaults::smtp_timeout_millis(),
            send_delay_millis: defaults::send_delay_millis(),
            poll_interval_millis: defaults::poll_interval_millis(),
        }
    }
}

impl Timings {
    #[must_use]
    pub const fn smtp_timeout(&self) -> Duration {
        Duration::from_millis(self.smtp_timeout_millis)
    }

    #[must_use]
    pub const fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_millis)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }
}

mod defaults {
    use super::{DEFAULT_POLL_INTERVAL, DEFAULT_SEND_DELAY, DEFAULT_SMTP_TIMEOUT};

    #[allow(clippy::cast_possible_truncation)]
    pub const fn smtp_timeout_millis() -> u64 {
        DEFAULT_SMTP_TIMEOUT.as_millis() as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    pub const fn send_delay_millis() -> u64 {
        DEFAULT_SEND_DELAY.as_millis() as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    pub const fn poll_interval_millis() -> u64 {
        DEFAULT_POLL_INTERVAL.as_millis() as u64
    }
}
