//! One dispatch run.
//!
//! A batch opens exactly one session, walks the recipient source in order and
//! sends one message per valid recipient, pausing after every attempt. Only a
//! failure to set the batch up (session or source) or losing the connection
//! ends it early; anything that goes wrong for a single recipient is logged
//! and recorded in the [`BatchReport`].

use std::{path::PathBuf, time::Duration};

use mailwatch_common::{
    config::{SmtpParameters, timings::DEFAULT_SEND_DELAY},
    error_log::ErrorLog,
    internal,
};

use crate::{
    error::{BatchFatalError, RecipientError},
    recipient::Recipient,
    session::{SessionSettings, SmtpSession},
    source::RecipientSource,
    template::MessageTemplate,
};

/// A message the server accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub recipient: Recipient,
    /// The server's reply to the end of DATA, typically carrying a queue id.
    pub reply: String,
}

/// Per-recipient results of a batch that ran to the end of its source.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<Result<Sent, RecipientError>>,
}

impl BatchReport {
    pub fn sent(&self) -> impl Iterator<Item = &Sent> {
        self.outcomes.iter().filter_map(|outcome| outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecipientError> {
        self.outcomes.iter().filter_map(|outcome| outcome.as_ref().err())
    }

    /// Number of recipients a send was attempted for, successful or not.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| match outcome {
                Ok(_) => true,
                Err(failure) => failure.was_attempted(),
            })
            .count()
    }
}

/// Everything one batch needs.
#[derive(Debug, Clone)]
pub struct Batch {
    pub template: MessageTemplate,
    pub smtp: SmtpParameters,
    pub source: PathBuf,
    pub session: SessionSettings,
    /// Pause after every send attempt.
    pub send_delay: Duration,
}

impl Batch {
    /// A batch using the default session settings and send delay.
    #[must_use]
    pub fn new(template: MessageTemplate, smtp: SmtpParameters, source: impl Into<PathBuf>) -> Self {
        Self {
            template,
            smtp,
            source: source.into(),
            session: SessionSettings::default(),
            send_delay: DEFAULT_SEND_DELAY,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub const fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Runs the batch to completion.
    ///
    /// Per-recipient failures are appended to `error_log` as they happen.
    /// Batch-fatal errors are returned, not logged: the caller handles them.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchFatalError`] if the session or the recipient source
    /// cannot be set up, or if the connection drops mid-batch. The session is
    /// released first.
    #[tracing::instrument(
        skip_all,
        fields(source = %self.source.display(), server = %self.smtp.address())
    )]
    pub async fn run(&self, error_log: &ErrorLog) -> Result<BatchReport, BatchFatalError> {
        internal!(level = INFO, "Starting batch");

        let mut session = SmtpSession::open(&self.smtp, &self.session).await?;
        let result = self.send_all(&mut session, error_log).await;
        session.close().await;

        if let Ok(report) = &result {
            internal!(
                level = INFO,
                attempted = report.attempted(),
                sent = report.sent().count(),
                failed = report.failures().count(),
                "Batch complete"
            );
        }

        result
    }

    async fn send_all(
        &self,
        session: &mut SmtpSession,
        error_log: &ErrorLog,
    ) -> Result<BatchReport, BatchFatalError> {
        let mut source = RecipientSource::open(&self.source).await?;
        let mut report = BatchReport::default();

        while let Some(candidate) = source.next_candidate().await? {
            let recipient = match Recipient::parse(candidate) {
                Ok(recipient) => recipient,
                Err(invalid) => {
                    record_failure(error_log, &invalid).await;
                    report.outcomes.push(Err(invalid));
                    continue;
                }
            };

            let outcome = session.send(&self.template, &recipient).await?;
            match &outcome {
                Ok(_) => tracing::debug!(%recipient, "Sent"),
                Err(failure) => record_failure(error_log, failure).await,
            }
            report.outcomes.push(outcome);

            tokio::time::sleep(self.send_delay).await;
        }

        Ok(report)
    }
}

async fn record_failure(error_log: &ErrorLog, failure: &RecipientError) {
    tracing::warn!(error = %failure, "Recipient skipped");
    error_log.append(&failure.to_string()).await;
}
