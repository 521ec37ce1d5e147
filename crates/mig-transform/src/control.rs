//! Cooperative pause / cancel for batch execution
//!
//! The batch executor checks the gate before starting each file, so a pause
//! or cancel never interrupts a transform that is already in flight.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Execution state seen by the batch executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Files may start
    Running,
    /// New files wait
    Paused,
    /// No new files start
    Cancelled,
}

/// Shared control handle for one job
#[derive(Debug, Clone)]
pub struct JobControl {
    tx: Arc<watch::Sender<RunState>>,
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

impl JobControl {
    /// New handle in the running state
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::Running);
        Self { tx: Arc::new(tx) }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.tx.borrow()
    }

    /// Whether cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == RunState::Cancelled
    }

    /// Pause; returns false unless the handle was running
    pub fn pause(&self) -> bool {
        self.transition(RunState::Running, RunState::Paused)
    }

    /// Resume; returns false unless the handle was paused
    pub fn resume(&self) -> bool {
        self.transition(RunState::Paused, RunState::Running)
    }

    /// Cancel; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(RunState::Cancelled);
    }

    fn transition(&self, from: RunState, to: RunState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        })
    }

    /// Wait while paused
    ///
    /// Returns `true` when the caller may start work and `false` once the
    /// handle is cancelled.
    pub async fn wait_until_runnable(&self) -> bool {
        let mut rx = self.tx.subscribe();
        let runnable = match rx.wait_for(|state| *state != RunState::Paused).await {
            Ok(state) => *state == RunState::Running,
            Err(_) => false,
        };
        runnable
    }
}
