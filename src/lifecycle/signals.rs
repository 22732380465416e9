//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGINT and SIGTERM (Ctrl-C on non-unix targets)
//! - Accept programmatic shutdown requests through `ShutdownHandle`
//! - Deliver exactly one termination event, then stop listening
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Any other signal is ignored
//! - No timeout: the wait ends only when a signal arrives

use std::fmt;

use tokio::sync::mpsc;

/// What ended the signal wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    /// Injected through a `ShutdownHandle`.
    Requested,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => f.write_str("SIGINT"),
            ShutdownSignal::Terminate => f.write_str("SIGTERM"),
            ShutdownSignal::Requested => f.write_str("requested"),
        }
    }
}

/// Cloneable handle that injects a termination event.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<ShutdownSignal>,
}

impl ShutdownHandle {
    /// Create a handle and the receiving end consumed by `SignalListener`.
    pub fn channel() -> (Self, mpsc::Receiver<ShutdownSignal>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Request a graceful shutdown. Extra requests are dropped.
    pub fn trigger(&self) {
        self.deliver(ShutdownSignal::Requested);
    }

    /// Deliver a specific signal, as if the OS had sent it.
    pub fn deliver(&self, signal: ShutdownSignal) {
        if self.tx.try_send(signal).is_err() {
            tracing::debug!(signal = %signal, "Shutdown already pending, request dropped");
        }
    }
}

/// Installed signal listeners plus the programmatic request channel.
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    requested: mpsc::Receiver<ShutdownSignal>,
}

impl SignalListener {
    /// Install OS signal listeners.
    #[cfg(unix)]
    pub fn install(requested: mpsc::Receiver<ShutdownSignal>) -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            requested,
        })
    }

    #[cfg(not(unix))]
    pub fn install(requested: mpsc::Receiver<ShutdownSignal>) -> std::io::Result<Self> {
        Ok(Self { requested })
    }

    /// Block until one termination event arrives.
    ///
    /// Consumes the listener so no further signals are observed.
    #[cfg(unix)]
    pub async fn recv(mut self) -> ShutdownSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ShutdownSignal::Interrupt,
            _ = self.terminate.recv() => ShutdownSignal::Terminate,
            Some(signal) = self.requested.recv() => signal,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(mut self) -> ShutdownSignal {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => ShutdownSignal::Interrupt,
            Some(signal) = self.requested.recv() => signal,
        }
    }
}
