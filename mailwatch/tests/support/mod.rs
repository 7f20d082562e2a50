//! Test support shared with the dispatch crate's tests.

#[path = "../../../mailwatch-dispatch/tests/support/mock_server.rs"]
pub mod mock_server;

use std::sync::{Arc, Mutex};

use mailwatch::surface::Surface;

/// What the operator would have seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shown {
    Status(String),
    Error(String),
}

/// A [`Surface`] that records everything shown on it.
#[derive(Debug, Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Shown>>>);

impl Recorder {
    pub fn shown(&self) -> Vec<Shown> {
        self.0.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.shown()
            .into_iter()
            .filter_map(|shown| match shown {
                Shown::Status(text) => Some(text),
                Shown::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.shown()
            .into_iter()
            .filter_map(|shown| match shown {
                Shown::Error(text) => Some(text),
                Shown::Status(_) => None,
            })
            .collect()
    }
}

impl Surface for Recorder {
    fn status(&self, text: &str) {
        self.0.lock().unwrap().push(Shown::Status(text.to_string()));
    }

    fn notify_error(&self, text: &str) {
        self.0.lock().unwrap().push(Shown::Error(text.to_string()));
    }
}
