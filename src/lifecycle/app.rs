//! App lifecycle controller.
//!
//! # Data Flow
//! ```text
//! App::new:   Uninitialized → Initializing
//!             → container: init_mandatory → init_optional → mark_ready
//!
//! App::run:   Initializing → Running
//!             → freeze hooks, install signal listeners
//!             → spawn listener, await bound address
//!             → go-live: start queue, start scheduler, publish address
//!             → wait for one signal
//!             → Running → ShuttingDown
//!             → drain listener (bounded) → hooks → container close
//!             → ShuttingDown → Stopped
//! ```
//!
//! # Design Decisions
//! - One container per `App`; no process-wide singleton
//! - Fatal errors after `Running` still drain and tear down before they
//!   are returned
//! - Teardown failures never turn a clean shutdown into an error; they are
//!   reported in `ShutdownReport`

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

use crate::config::{self, AppSettings};
use crate::container::{Container, TeardownReport};
use crate::error::{AppError, UsageError};
use crate::http::ListenerTask;
use crate::lifecycle::context::AppContext;
use crate::lifecycle::shutdown::{Shutdown, ShutdownHooks};
use crate::lifecycle::signals::{ShutdownHandle, ShutdownSignal, SignalListener};
use crate::lifecycle::state::{LifecycleState, StateCell};
use crate::observability::{logging, metrics};
use crate::subsystem::provider::SubsystemProvider;
use crate::subsystem::{SubsystemError, SubsystemKind};

/// How the listener finished draining.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// In-flight requests completed within the deadline.
    Drained,
    /// Deadline hit; the listener task was aborted.
    TimedOut,
    /// The listener task ended with an error.
    Failed(String),
    /// No listener task was running.
    Skipped,
}

impl DrainOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            DrainOutcome::Drained => "drained",
            DrainOutcome::TimedOut => "timed_out",
            DrainOutcome::Failed(_) => "failed",
            DrainOutcome::Skipped => "skipped",
        }
    }
}

/// Summary of a completed `run()`.
#[derive(Debug)]
pub struct ShutdownReport {
    pub signal: ShutdownSignal,
    pub drain: DrainOutcome,
    pub teardown: TeardownReport,
    /// Time from signal receipt to `Stopped`.
    pub elapsed: Duration,
}

type ListenerHandle = JoinHandle<std::io::Result<()>>;

pub struct App {
    context: AppContext,
    state: StateCell,
    hooks: ShutdownHooks,
    shutdown: Shutdown,
    handle: ShutdownHandle,
    requested: Mutex<Option<mpsc::Receiver<ShutdownSignal>>>,
    live: watch::Sender<Option<SocketAddr>>,
}

impl App {
    /// Build the container and initialize every required subsystem.
    ///
    /// On failure, handles created so far are closed and the state stays
    /// `Initializing`.
    pub async fn new(settings: AppSettings, provider: Arc<dyn SubsystemProvider>) -> Result<Self, AppError> {
        let state = StateCell::new();
        // a fresh cell always starts Uninitialized
        let _ = state.transition(LifecycleState::Uninitialized, LifecycleState::Initializing);

        let settings = Arc::new(settings);
        let span = logging::app_span(&settings.app);
        let mut container = Container::new(settings, provider);

        let init = async {
            container.init_mandatory().await?;
            container.init_optional().await
        }
        .instrument(span.clone())
        .await;

        if let Err(e) = init {
            let report = container.close().instrument(span.clone()).await;
            span.in_scope(|| {
                tracing::error!(error = %e, teardown = %report, "Initialization failed");
            });
            return Err(e.into());
        }

        container.mark_ready();
        span.in_scope(|| tracing::info!("App initialized"));

        let (handle, requested) = ShutdownHandle::channel();
        let (live, _) = watch::channel(None);

        Ok(Self {
            context: AppContext::new(Arc::new(container), span),
            state,
            hooks: ShutdownHooks::new(),
            shutdown: Shutdown::new(),
            handle,
            requested: Mutex::new(Some(requested)),
            live,
        })
    }

    /// Load the snapshot from the process environment, then `new`.
    pub async fn from_env(provider: Arc<dyn SubsystemProvider>) -> Result<Self, AppError> {
        Self::new(config::load_from_env(), provider).await
    }

    pub fn context(&self) -> AppContext {
        self.context.clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Emits the bound listener address once the app has gone live.
    pub fn subscribe_live(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.live.subscribe()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.live.borrow()
    }

    /// Injects termination events, as if the OS had delivered a signal.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Register a teardown callback. Only accepted before `run()`.
    pub fn add_shutdown_hook<F, Fut>(&self, hook: F) -> Result<(), UsageError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.hooks.register(hook)
    }

    /// Serve until a termination signal, then shut down gracefully.
    pub async fn run(&self) -> Result<ShutdownReport, AppError> {
        // Hooks close before the state reads Running.
        self.hooks.freeze();
        self.state
            .transition(LifecycleState::Initializing, LifecycleState::Running)
            .map_err(|actual| match actual {
                LifecycleState::ShuttingDown | LifecycleState::Stopped => UsageError::AlreadyStopped,
                _ => UsageError::AlreadyRunning,
            })?;

        let span = self.context.logger().clone();
        self.serve().instrument(span).await
    }

    async fn serve(&self) -> Result<ShutdownReport, AppError> {
        let requested = self.requested.lock().take().ok_or(UsageError::AlreadyRunning)?;
        let signals = match SignalListener::install(requested) {
            Ok(signals) => signals,
            Err(e) => return self.abort(AppError::Signal(e), None).await,
        };

        let ListenerTask { bound, handle } = match self.spawn_listener() {
            Ok(task) => task,
            Err(source) => {
                let error = AppError::Start {
                    subsystem: SubsystemKind::Listener,
                    source,
                };
                return self.abort(error, None).await;
            }
        };

        let addr = match bound.await {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => return self.abort(AppError::Listener(e), Some(handle)).await,
            Err(_) => {
                let e = std::io::Error::other("listener task exited before binding");
                return self.abort(AppError::Listener(e), Some(handle)).await;
            }
        };

        if let Err(error) = self.go_live().await {
            return self.abort(error, Some(handle)).await;
        }
        tracing::info!(address = %addr, "Listening");
        self.live.send_replace(Some(addr));

        let signal = self.hooks.freeze_and_wait(signals).await;
        let started = Instant::now();

        let (drain, teardown) = self.wind_down(Some(handle)).await;
        let elapsed = started.elapsed();
        metrics::record_shutdown(elapsed);

        if teardown.is_clean() {
            tracing::info!(signal = %signal, elapsed = ?elapsed, "Shutdown complete");
        } else {
            tracing::warn!(signal = %signal, elapsed = ?elapsed, teardown = %teardown, "Shutdown completed with teardown failures");
        }

        Ok(ShutdownReport {
            signal,
            drain,
            teardown,
            elapsed,
        })
    }

    fn spawn_listener(&self) -> Result<ListenerTask, SubsystemError> {
        let listener = self
            .context
            .listener()
            .map_err(|e| SubsystemError::Unavailable(e.to_string()))?
            .ok_or_else(|| SubsystemError::Unavailable("listener is not initialized".to_string()))?;
        listener.spawn(self.state.clone(), self.shutdown.subscribe())
    }

    /// Start deferred subsystems: queue, then scheduler.
    async fn go_live(&self) -> Result<(), AppError> {
        for (subsystem, starting) in self.context.container().starters() {
            match starting.await {
                Ok(()) => tracing::info!(subsystem = %subsystem, "Subsystem started"),
                Err(source) => {
                    tracing::error!(subsystem = %subsystem, error = %source, "Subsystem failed to start");
                    return Err(AppError::Start { subsystem, source });
                }
            }
        }
        Ok(())
    }

    /// Tear down after a fatal error past `Running`, then surface it.
    async fn abort(&self, error: AppError, listener: Option<ListenerHandle>) -> Result<ShutdownReport, AppError> {
        tracing::error!(error = %error, "Fatal error, shutting down");
        let (drain, teardown) = self.wind_down(listener).await;
        tracing::warn!(drain = drain.as_str(), teardown = %teardown, "Shut down after fatal error");
        Err(error)
    }

    /// Drain, run hooks, close the container, reach `Stopped`.
    async fn wind_down(&self, listener: Option<ListenerHandle>) -> (DrainOutcome, TeardownReport) {
        if let Err(actual) = self
            .state
            .transition(LifecycleState::Running, LifecycleState::ShuttingDown)
        {
            tracing::warn!(state = %actual, "Unexpected state at shutdown");
        }
        self.shutdown.trigger();

        let drain = match listener {
            Some(handle) => self.drain(handle).await,
            None => DrainOutcome::Skipped,
        };
        metrics::record_drain(drain.as_str());

        let hooks = self.hooks.run_all().await;
        tracing::debug!(hooks, "Shutdown hooks finished");

        let teardown = self.context.container().close().await;

        if let Err(actual) = self
            .state
            .transition(LifecycleState::ShuttingDown, LifecycleState::Stopped)
        {
            tracing::warn!(state = %actual, "Unexpected state after teardown");
        }

        (drain, teardown)
    }

    async fn drain(&self, mut handle: ListenerHandle) -> DrainOutcome {
        let limit = self.context.config().http.shutdown_timeout();

        match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(Ok(()))) => DrainOutcome::Drained,
            Ok(Ok(Err(e))) => DrainOutcome::Failed(e.to_string()),
            Ok(Err(e)) => DrainOutcome::Failed(e.to_string()),
            Err(_) => {
                tracing::warn!(timeout = ?limit, "Listener drain timed out, aborting in-flight requests");
                handle.abort();
                DrainOutcome::TimedOut
            }
        }
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("state", &self.state.get())
            .field("hooks", &self.hooks)
            .field("container", self.context.container())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::memory::InMemoryProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_settings() -> AppSettings {
        let mut settings = AppSettings::default();
        settings.http.host = "127.0.0.1".to_string();
        settings.http.port = 0;
        settings
    }

    async fn app() -> App {
        App::new(test_settings(), Arc::new(InMemoryProvider::new())).await.unwrap()
    }

    #[tokio::test]
    async fn new_leaves_app_initializing_with_ready_container() {
        let app = app().await;
        assert_eq!(app.state(), LifecycleState::Initializing);
        assert!(app.context().queue().unwrap().is_some());
        assert!(app.local_addr().is_none());
    }

    #[tokio::test]
    async fn requested_shutdown_runs_the_full_sequence() {
        let app = app().await;
        let hooks = Arc::new(AtomicUsize::new(0));
        let counter = hooks.clone();
        app.add_shutdown_hook(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        app.shutdown_handle().trigger();
        let report = app.run().await.unwrap();

        assert_eq!(report.signal, ShutdownSignal::Requested);
        assert_eq!(report.drain, DrainOutcome::Drained);
        assert!(report.teardown.is_clean());
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
        assert_eq!(app.state(), LifecycleState::Stopped);
        assert!(app.local_addr().is_some());
    }

    #[tokio::test]
    async fn run_after_stop_is_rejected() {
        let app = app().await;
        app.shutdown_handle().trigger();
        app.run().await.unwrap();

        let err = app.run().await.unwrap_err();
        assert!(matches!(err, AppError::Usage(UsageError::AlreadyStopped)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn hooks_are_rejected_once_running() {
        let app = app().await;
        app.shutdown_handle().trigger();
        app.run().await.unwrap();

        assert_eq!(app.add_shutdown_hook(|| async {}), Err(UsageError::HooksFrozen));
    }

    #[tokio::test]
    async fn hooks_are_frozen_by_the_time_running_is_observed() {
        let app = Arc::new(app().await);
        let mut state = app.subscribe_state();

        let runner = tokio::spawn({
            let app = app.clone();
            async move { app.run().await }
        });

        state
            .wait_for(|state| *state == LifecycleState::Running)
            .await
            .unwrap();
        assert!(app.hooks.is_frozen());
        assert_eq!(app.add_shutdown_hook(|| async {}), Err(UsageError::HooksFrozen));

        app.shutdown_handle().trigger();
        runner.await.unwrap().unwrap();
    }
}
