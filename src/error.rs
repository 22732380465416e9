//! Error taxonomy for the orchestration core.
//!
//! # Categories
//! - `InitError`: fatal; the process must not reach `Running`
//! - `UsageError`: caller misused the lifecycle API
//! - `AppError`: everything `App::new` / `App::run` can surface
//!
//! # Design Decisions
//! - No variant is retried anywhere in the core
//! - Teardown failures are not errors here; they are collected in
//!   `container::TeardownReport`

use std::time::Duration;
use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::subsystem::{SubsystemError, SubsystemKind};

/// Failure while building the container. Always fatal.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to initialize {subsystem}: {source}")]
    Subsystem {
        subsystem: SubsystemKind,
        #[source]
        source: SubsystemError,
    },

    #[error("invalid {subsystem} settings: {}", join_errors(.errors))]
    InvalidSettings {
        subsystem: SubsystemKind,
        errors: Vec<ValidationError>,
    },

    #[error("{subsystem} requires {requires} to be initialized first")]
    MissingDependency {
        subsystem: SubsystemKind,
        requires: SubsystemKind,
    },

    #[error("{0} is already initialized")]
    AlreadyInitialized(SubsystemKind),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lifecycle API called in the wrong state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum UsageError {
    #[error("container has not finished initialization")]
    NotReady,

    #[error("app is already running")]
    AlreadyRunning,

    #[error("app has already been stopped")]
    AlreadyStopped,

    #[error("app is already running, shutdown hooks must be added before calling run()")]
    HooksFrozen,
}

/// Top-level error returned by the lifecycle controller.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("listener failed: {0}")]
    Listener(#[source] std::io::Error),

    #[error("failed to start {subsystem}: {source}")]
    Start {
        subsystem: SubsystemKind,
        #[source]
        source: SubsystemError,
    },

    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] std::io::Error),
}

impl AppError {
    /// Whether the process should terminate on this error.
    ///
    /// Usage errors are reported to the caller; everything else means the
    /// process can no longer serve.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AppError::Usage(_))
    }
}

/// Why a single subsystem failed to close.
#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("close failed: {0}")]
    Failed(#[source] SubsystemError),

    #[error("close did not finish within {0:?}")]
    TimedOut(Duration),
}
