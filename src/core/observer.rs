//! Observer contract for presentation layers
//!
//! A GUI widget tree, a terminal progress bar or a log sink implements
//! [`ProgressObserver`] to follow a run. Callbacks are only ever invoked on the
//! controlling context, one at a time: any number of progress/step callbacks
//! followed by exactly one terminal callback.
//!
//! The terminal callback is the run's one-way transition to `terminal`.
//! Snapshots passed to [`ProgressObserver::on_progress`] always have
//! `terminal == false`; the final snapshot with `terminal` (and `cancelled`)
//! set is available from [`OperationRunner::progress`] once the terminal
//! callback has returned.
//!
//! [`OperationRunner::progress`]: crate::core::runner::OperationRunner::progress

use std::fmt::Debug;
use tracing::{error, info, warn};

use crate::core::models::{ErrorKind, ProgressState};

pub trait ProgressObserver<P> {
    /// Non-terminal snapshot, in production order
    fn on_progress(&mut self, state: &ProgressState);

    fn on_step_changed(&mut self, _index: usize, _name: &str) {}

    fn on_success(&mut self, payload: P);

    fn on_failure(&mut self, kind: ErrorKind, detail: &str);

    fn on_cancelled(&mut self);
}

/// Observer that writes every callback to the tracing log
#[derive(Debug, Default, Clone)]
pub struct TracingObserver {
    label: String,
}

impl TracingObserver {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl<P: Debug> ProgressObserver<P> for TracingObserver {
    fn on_progress(&mut self, state: &ProgressState) {
        info!("[{}] {}", self.label, state);
    }

    fn on_step_changed(&mut self, index: usize, name: &str) {
        info!("[{}] step {} started: {}", self.label, index + 1, name);
    }

    fn on_success(&mut self, payload: P) {
        info!("[{}] completed: {:?}", self.label, payload);
    }

    fn on_failure(&mut self, kind: ErrorKind, detail: &str) {
        error!("[{}] failed ({}): {}", self.label, kind, detail);
    }

    fn on_cancelled(&mut self) {
        warn!("[{}] cancelled by user", self.label);
    }
}
