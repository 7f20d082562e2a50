//! Modification-time polling of the recipient source.
//!
//! [`WatchState`] is the whole of the scheduler's memory: the watched path and
//! the last modification time that triggered (or was captured at startup).
//! It is updated as soon as a change is seen, before the batch for that
//! change runs, so a failing batch is never re-triggered by the same change.

use std::{
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::source::SourceError;

/// Result of one poll.
#[derive(Debug)]
pub enum Poll {
    /// The modification time has not advanced.
    Unchanged,
    /// The modification time advanced; a batch should run.
    Changed(SystemTime),
    /// The source disappeared since the last poll.
    Missing(SourceError),
    /// The source is still missing; already reported.
    StillMissing,
}

#[derive(Debug, Clone)]
pub struct WatchState {
    source: PathBuf,
    last_observed: Option<SystemTime>,
    missing: bool,
}

impl WatchState {
    /// A state that has observed nothing yet.
    #[must_use]
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            last_observed: None,
            missing: false,
        }
    }

    /// Records the current modification time as the baseline, without
    /// triggering.
    ///
    /// # Errors
    ///
    /// Returns the error if the source cannot be stat'ed; the baseline then
    /// stays empty.
    pub fn capture(&mut self) -> Result<(), SourceError> {
        match modified(&self.source) {
            Ok(at) => {
                self.last_observed = Some(at);
                self.missing = false;
                Ok(())
            }
            Err(err) => {
                self.missing = true;
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    #[must_use]
    pub const fn last_observed(&self) -> Option<SystemTime> {
        self.last_observed
    }

    /// Checks the source once. Costs a single `stat`.
    ///
    /// Only a strictly later modification time counts as a change. With no
    /// baseline (the source was missing at startup) any existing file does.
    pub fn poll(&mut self) -> Poll {
        let current = match modified(&self.source) {
            Ok(current) => current,
            Err(_) if self.missing => return Poll::StillMissing,
            Err(err) => {
                self.missing = true;
                return Poll::Missing(err);
            }
        };
        self.missing = false;

        if self.last_observed.is_none_or(|last| current > last) {
            self.last_observed = Some(current);
            Poll::Changed(current)
        } else {
            Poll::Unchanged
        }
    }
}

fn modified(path: &Path) -> Result<SystemTime, SourceError> {
    std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SourceError::NotFound(path.to_path_buf())
            } else {
                SourceError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
}

/// Drives [`WatchState::poll`] at a fixed interval.
///
/// Ticks that fall due while the caller is busy are not queued up; the next
/// tick comes one full interval after the caller is ready again.
pub struct Scheduler {
    state: WatchState,
    interval: Interval,
}

impl Scheduler {
    /// The first tick is one `poll_interval` from now.
    #[must_use]
    pub fn new(state: WatchState, poll_interval: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self { state, interval }
    }

    /// Waits for the next tick.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    pub fn poll(&mut self) -> Poll {
        self.state.poll()
    }

    #[must_use]
    pub const fn state(&self) -> &WatchState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{File, FileTimes};

    use super::*;

    fn touch(path: &Path, at: SystemTime) {
        let file = File::options().create(true).append(true).open(path).unwrap();
        file.set_times(FileTimes::new().set_modified(at)).unwrap();
    }

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    #[test]
    fn capture_does_not_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email_list.csv");
        touch(&path, at(0));

        let mut state = WatchState::new(&path);
        state.capture().unwrap();

        assert_eq!(state.last_observed(), Some(at(0)));
        assert!(matches!(state.poll(), Poll::Unchanged));
    }

    #[test]
    fn only_a_later_time_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email_list.csv");
        touch(&path, at(10));

        let mut state = WatchState::new(&path);
        state.capture().unwrap();

        touch(&path, at(5));
        assert!(matches!(state.poll(), Poll::Unchanged));
        assert_eq!(state.last_observed(), Some(at(10)));

        touch(&path, at(20));
        assert!(matches!(state.poll(), Poll::Changed(t) if t == at(20)));
        assert_eq!(state.last_observed(), Some(at(20)));

        // Same timestamp again: no second trigger
        assert!(matches!(state.poll(), Poll::Unchanged));
        touch(&path, at(20));
        assert!(matches!(state.poll(), Poll::Unchanged));
    }

    #[test]
    fn missing_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email_list.csv");

        let mut state = WatchState::new(&path);
        assert!(matches!(state.capture(), Err(SourceError::NotFound(_))));
        assert_eq!(state.last_observed(), None);

        // Already reported by capture
        assert!(matches!(state.poll(), Poll::StillMissing));

        touch(&path, at(0));
        assert!(matches!(state.poll(), Poll::Changed(_)));
        assert!(matches!(state.poll(), Poll::Unchanged));
    }

    #[test]
    fn disappearing_source_keeps_last_observed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("email_list.csv");
        touch(&path, at(10));

        let mut state = WatchState::new(&path);
        state.capture().unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(state.poll(), Poll::Missing(SourceError::NotFound(_))));
        assert!(matches!(state.poll(), Poll::StillMissing));
        assert_eq!(state.last_observed(), Some(at(10)));

        // Restored with the old timestamp: nothing to do
        touch(&path, at(10));
        assert!(matches!(state.poll(), Poll::Unchanged));

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(state.poll(), Poll::Missing(_)));
        touch(&path, at(11));
        assert!(matches!(state.poll(), Poll::Changed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_a_full_interval() {
        let mut scheduler = Scheduler::new(WatchState::new("unused.csv"), Duration::from_secs(5));
        let start = Instant::now();

        scheduler.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(5));

        scheduler.tick().await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
