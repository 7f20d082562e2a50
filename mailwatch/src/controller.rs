//! The single-batch driver.
//!
//! The [`Controller`] runs on the interface task. Triggers come in as
//! [`Command`]s (manual) or poll ticks (scheduled); each accepted trigger
//! spawns one batch on a background task, whose result comes back over a
//! channel and is handled here, once, at the batch boundary. At most one
//! batch is ever in flight.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use mailwatch_common::{
    config::{Config, ValidationError},
    error_log::ErrorLog,
    internal,
};
use mailwatch_dispatch::{
    Batch, BatchFatalError, BatchReport, MessageTemplate, Poll, Scheduler, SessionSettings,
    WatchState,
};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{config, surface::Surface};

pub const STATUS_SENDING: &str = "Sending emails...";
pub const STATUS_SENT: &str = "Emails sent successfully!";
pub const STATUS_FAILED: &str = "Error occurred. Check error log.";

/// What started a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The operator asked for it.
    Manual,
    /// The recipient source changed.
    Scheduled,
}

/// Operator input to a running [`Controller::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Send,
    Shutdown,
}

/// Why a trigger did not start a batch.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("A batch is already running.")]
    Busy,
}

/// Set while a batch is in flight; cleared when dropped, even if the batch
/// task panics.
struct Busy(Arc<AtomicBool>);

impl Busy {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A batch task's result, sent back to the interface task.
pub struct Finished {
    pub trigger: Trigger,
    pub result: Result<BatchReport, BatchFatalError>,
    // Held until the result has been handled
    _busy: Busy,
}

pub struct Controller<S> {
    config: Config,
    /// Reloaded before every trigger, when set.
    config_path: Option<PathBuf>,
    /// Fixed for the controller's lifetime, whatever later reloads say.
    source: PathBuf,
    error_log: ErrorLog,
    surface: S,
    busy: Arc<AtomicBool>,
    finished_tx: mpsc::Sender<Finished>,
    finished_rx: mpsc::Receiver<Finished>,
}

impl<S: Surface> Controller<S> {
    #[must_use]
    pub fn new(config: Config, surface: S) -> Self {
        let (finished_tx, finished_rx) = mpsc::channel(1);

        Self {
            source: config.source.clone(),
            error_log: ErrorLog::new(&config.error_log),
            config,
            config_path: None,
            surface,
            busy: Arc::new(AtomicBool::new(false)),
            finished_tx,
            finished_rx,
        }
    }

    /// Re-read the form (and everything but the source path) from `path`
    /// at every trigger.
    #[must_use]
    pub fn reloading_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    #[must_use]
    pub const fn surface(&self) -> &S {
        &self.surface
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Starts a batch in the background.
    ///
    /// The result arrives through [`next_finished`](Self::next_finished).
    pub fn start(&mut self, trigger: Trigger) -> Result<(), Rejection> {
        if self.is_busy() {
            return Err(Rejection::Busy);
        }

        self.reload();
        let batch = self.prepare()?;
        let busy = Busy::acquire(&self.busy).ok_or(Rejection::Busy)?;

        self.surface.status(STATUS_SENDING);
        internal!(level = INFO, ?trigger, source = %self.source.display(), "Batch started");

        let error_log = self.error_log.clone();
        let finished = self.finished_tx.clone();
        tokio::spawn(async move {
            let result = batch.run(&error_log).await;
            let _ = finished
                .send(Finished {
                    trigger,
                    result,
                    _busy: busy,
                })
                .await;
        });

        Ok(())
    }

    /// Like [`start`](Self::start), handling a rejection the way the trigger
    /// calls for: a manual trigger only notifies, while an unusable form at a
    /// scheduled trigger fails that batch.
    pub async fn trigger(&mut self, trigger: Trigger) {
        match (self.start(trigger), trigger) {
            (Ok(()), _) => {}
            (Err(rejection), Trigger::Manual) => {
                tracing::warn!(%rejection, "Manual trigger rejected");
                self.surface.notify_error(&rejection.to_string());
            }
            (Err(Rejection::Validation(invalid)), Trigger::Scheduled) => {
                self.fail(&BatchFatalError::InvalidForm(invalid)).await;
            }
            (Err(Rejection::Busy), Trigger::Scheduled) => {
                tracing::debug!("Batch in flight, scheduled trigger dropped");
            }
        }
    }

    /// Waits for the in-flight batch, if any, to report back.
    pub async fn next_finished(&mut self) -> Option<Finished> {
        if self.is_busy() {
            self.finished_rx.recv().await
        } else {
            None
        }
    }

    /// Handles a batch result at the batch boundary. Returns the report of a
    /// batch that ran to completion.
    pub async fn finish(&self, finished: Finished) -> Option<BatchReport> {
        match finished.result {
            Ok(report) => {
                internal!(
                    level = INFO,
                    trigger = ?finished.trigger,
                    sent = report.sent().count(),
                    failed = report.failures().count(),
                    "Batch finished"
                );
                self.surface.status(STATUS_SENT);
                Some(report)
            }
            Err(fatal) => {
                self.fail(&fatal).await;
                None
            }
        }
    }

    /// Runs a single manual batch to completion.
    pub async fn send_once(&mut self) -> Result<Option<BatchReport>, Rejection> {
        self.start(Trigger::Manual)?;

        let Some(finished) = self.next_finished().await else {
            return Ok(None);
        };
        Ok(self.finish(finished).await)
    }

    /// Watches the recipient source until told to shut down.
    ///
    /// On shutdown a running batch is waited for; a second shutdown command
    /// abandons it.
    pub async fn watch(&mut self, mut commands: mpsc::Receiver<Command>) {
        let mut state = WatchState::new(&self.source);
        if let Err(missing) = state.capture() {
            self.report_error(&missing.to_string()).await;
        }
        let mut scheduler = Scheduler::new(state, self.config.timings.poll_interval());

        internal!(
            level = INFO,
            source = %self.source.display(),
            interval = ?self.config.timings.poll_interval(),
            "Watching"
        );

        loop {
            tokio::select! {
                () = scheduler.tick() => {
                    if self.is_busy() {
                        tracing::trace!("Batch in flight, poll skipped");
                        continue;
                    }

                    match scheduler.poll() {
                        Poll::Changed(at) => {
                            internal!(level = INFO, modified = ?at, "Recipient source changed");
                            self.trigger(Trigger::Scheduled).await;
                        }
                        Poll::Missing(missing) => self.report_error(&missing.to_string()).await,
                        Poll::Unchanged | Poll::StillMissing => {}
                    }
                }

                Some(finished) = self.finished_rx.recv() => {
                    self.finish(finished).await;
                }

                command = commands.recv() => match command {
                    Some(Command::Send) => self.trigger(Trigger::Manual).await,
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        if self.is_busy() {
            internal!(
                level = INFO,
                "Waiting for the running batch to finish -- Interrupt again to abandon it"
            );

            tokio::select! {
                Some(finished) = self.finished_rx.recv() => {
                    self.finish(finished).await;
                }
                Some(_) = commands.recv() => {
                    tracing::warn!("Running batch abandoned");
                }
            }
        }

        internal!(level = INFO, "Stopped watching");
    }

    fn reload(&mut self) {
        let Some(path) = &self.config_path else {
            return;
        };

        match config::load(path) {
            Ok(config) => self.config = config,
            Err(err) => {
                tracing::warn!(error = %err, "Keeping the previous configuration");
                self.surface.notify_error(&err.to_string());
            }
        }
    }

    fn prepare(&self) -> Result<Batch, ValidationError> {
        let form = self.config.form.validate()?;
        let template = MessageTemplate::new(&form.smtp.username, form.body);
        let session = SessionSettings {
            helo_name: self.config.helo_name.clone(),
            tls: self.config.tls,
            timeout: self.config.timings.smtp_timeout(),
        };

        Ok(Batch::new(template, form.smtp, &self.source)
            .with_session(session)
            .with_send_delay(self.config.timings.send_delay()))
    }

    async fn fail(&self, fatal: &BatchFatalError) {
        self.report_error(&fatal.to_string()).await;
    }

    /// Status, notification and one error log entry.
    async fn report_error(&self, message: &str) {
        tracing::error!("{message}");
        self.surface.status(STATUS_FAILED);
        self.surface.notify_error(message);
        self.error_log.append(message).await;
    }
}
