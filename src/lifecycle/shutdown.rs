//! Shutdown coordination.
//!
//! `Shutdown` fans the stop request out to long-running tasks (listener,
//! queue workers, scheduled jobs). `ShutdownHooks` holds the user teardown
//! callbacks that run once after the termination signal.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::UsageError;
use crate::lifecycle::signals::{ShutdownSignal, SignalListener};

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

type Hook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Ordered teardown callbacks, frozen once the app is running.
///
/// Hooks handle their own errors; the registry only sequences them.
#[derive(Default)]
pub struct ShutdownHooks {
    hooks: Mutex<Vec<Hook>>,
    frozen: AtomicBool,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook. Fails once the registry is frozen.
    pub fn register<F, Fut>(&self, hook: F) -> Result<(), UsageError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut hooks = self.hooks.lock();
        if self.frozen.load(Ordering::Acquire) {
            return Err(UsageError::HooksFrozen);
        }
        hooks.push(Box::new(move || hook().boxed()));
        Ok(())
    }

    pub fn freeze(&self) {
        let _hooks = self.hooks.lock();
        self.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freeze, then block until exactly one termination signal arrives.
    pub async fn freeze_and_wait(&self, listener: SignalListener) -> ShutdownSignal {
        self.freeze();
        let signal = listener.recv().await;
        tracing::info!(signal = %signal, "Shutdown signal received");
        signal
    }

    /// Run every hook once, in registration order. Returns how many ran.
    ///
    /// Hooks are taken out of the registry, so a second call runs nothing.
    pub async fn run_all(&self) -> usize {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        let count = hooks.len();
        for (index, hook) in hooks.into_iter().enumerate() {
            tracing::debug!(hook = index, "Running shutdown hook");
            hook().await;
        }
        count
    }
}

impl std::fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHooks")
            .field("hooks", &self.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}
