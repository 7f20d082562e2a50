//! Batch mailing for mailwatch.
//!
//! This crate provides:
//! - [`RecipientSource`]: a lazy reader over the rows of the recipient CSV
//! - [`Batch`]: one dispatch run over a single authenticated SMTP session
//! - [`Scheduler`]: the modification-time poll that triggers batches

mod batch;
mod error;
mod recipient;
mod scheduler;
mod session;
mod source;
mod template;

pub use batch::{Batch, BatchReport, Sent};
pub use error::{BatchFatalError, RecipientError};
pub use recipient::{Recipient, is_valid_address};
pub use scheduler::{Poll, Scheduler, WatchState};
pub use session::{SessionSettings, SmtpSession};
pub use source::{Candidate, RecipientSource, SourceError};
pub use template::MessageTemplate;
