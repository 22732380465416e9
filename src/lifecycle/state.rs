//! Lifecycle state machine.
//!
//! # States
//! ```text
//! Uninitialized → Initializing → Running → ShuttingDown → Stopped
//! ```
//!
//! # Design Decisions
//! - Transitions only move forward, one step at a time
//! - A failed `Initializing` step never transitions; the caller aborts
//! - Observers subscribe through a watch channel

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Stopped => "stopped",
        }
    }

    fn next(&self) -> Option<LifecycleState> {
        match self {
            LifecycleState::Uninitialized => Some(LifecycleState::Initializing),
            LifecycleState::Initializing => Some(LifecycleState::Running),
            LifecycleState::Running => Some(LifecycleState::ShuttingDown),
            LifecycleState::ShuttingDown => Some(LifecycleState::Stopped),
            LifecycleState::Stopped => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, observable lifecycle state.
#[derive(Debug, Clone)]
pub struct StateCell {
    tx: Arc<watch::Sender<LifecycleState>>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LifecycleState::Uninitialized);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> LifecycleState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.tx.subscribe()
    }

    /// Move from `from` to its successor.
    ///
    /// Fails with the actual current state if it is not `from` or if `to`
    /// is not the next state.
    pub fn transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), LifecycleState> {
        if from.next() != Some(to) {
            return Err(self.get());
        }

        let mut actual = from;
        let moved = self.tx.send_if_modified(|state| {
            actual = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });

        if moved {
            tracing::debug!(from = %from, to = %to, "Lifecycle transition");
            metrics::record_state(to);
            Ok(())
        } else {
            Err(actual)
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
