//! Service container.
//!
//! # Responsibilities
//! - Own one slot per subsystem handle
//! - Fill slots in a fixed order, gated by feature flags
//! - Hand out handles once initialization is complete
//! - Close every present handle exactly once, in reverse order
//!
//! # Data Flow
//! ```text
//! init_mandatory:  document store (flag) → queue
//! init_optional:   search (flag) → cache → mailer (flag) → listener
//!                  → scheduler → broker (flag)
//! mark_ready
//! close:           broker → scheduler → listener → mailer → cache
//!                  → search → queue → document store
//! ```
//!
//! # Design Decisions
//! - Slots are written through `&mut self` only; after `mark_ready` the
//!   container is shared behind an `Arc` and never mutated again
//! - Accessors never initialize on demand
//! - Validation runs before the provider is asked to connect

mod teardown;

pub use teardown::TeardownReport;

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::config::validation::{self, ValidationError};
use crate::config::AppSettings;
use crate::error::{InitError, UsageError};
use crate::http::HttpServer;
use crate::observability::metrics;
use crate::subsystem::provider::SubsystemProvider;
use crate::subsystem::{
    Broker, Cache, Closer, DocumentStore, Mailer, Queue, Scheduler, SearchIndex, SubsystemError, SubsystemKind,
};

use teardown::Closing;

pub struct Container {
    settings: Arc<AppSettings>,
    provider: Arc<dyn SubsystemProvider>,

    document_store: Option<Arc<dyn DocumentStore>>,
    search: Option<Arc<dyn SearchIndex>>,
    queue: Option<Arc<dyn Queue>>,
    cache: Option<Arc<dyn Cache>>,
    mailer: Option<Arc<dyn Mailer>>,
    listener: Option<Arc<HttpServer>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    broker: Option<Arc<dyn Broker>>,

    ready: bool,
    closed: AtomicBool,
}

impl Container {
    /// Store references only. Nothing is initialized yet.
    pub fn new(settings: Arc<AppSettings>, provider: Arc<dyn SubsystemProvider>) -> Self {
        Self {
            settings,
            provider,
            document_store: None,
            search: None,
            queue: None,
            cache: None,
            mailer: None,
            listener: None,
            scheduler: None,
            broker: None,
            ready: false,
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &Arc<AppSettings> {
        &self.settings
    }

    /// Document store (flag-gated), then the queue.
    pub async fn init_mandatory(&mut self) -> Result<(), InitError> {
        if self.settings.features.document_store {
            ensure_empty(&self.document_store, SubsystemKind::DocumentStore)?;
            validated(
                SubsystemKind::DocumentStore,
                validation::validate_document_store(&self.settings.document_store),
            )?;
            let handle = build(SubsystemKind::DocumentStore, self.provider.document_store(&self.settings)).await?;
            self.document_store = Some(handle);
        } else {
            skipped(SubsystemKind::DocumentStore);
        }

        ensure_empty(&self.queue, SubsystemKind::Queue)?;
        let handle = build(SubsystemKind::Queue, self.provider.queue(&self.settings)).await?;
        self.queue = Some(handle);

        Ok(())
    }

    /// Search, cache, mailer, listener, scheduler, broker. Stops at the
    /// first failure.
    pub async fn init_optional(&mut self) -> Result<(), InitError> {
        self.init_search().await?;

        ensure_empty(&self.cache, SubsystemKind::Cache)?;
        let handle = build(SubsystemKind::Cache, self.provider.cache(&self.settings)).await?;
        self.cache = Some(handle);

        self.init_mailer().await?;

        ensure_empty(&self.listener, SubsystemKind::Listener)?;
        let listener = HttpServer::new(self.settings.http.clone(), self.settings.app.clone());
        self.listener = Some(Arc::new(listener));
        metrics::record_subsystem_init(SubsystemKind::Listener, true);
        tracing::info!(
            subsystem = %SubsystemKind::Listener,
            address = %self.settings.http.bind_address(),
            "Subsystem initialized"
        );

        ensure_empty(&self.scheduler, SubsystemKind::Scheduler)?;
        let handle = build(SubsystemKind::Scheduler, self.provider.scheduler(&self.settings)).await?;
        self.scheduler = Some(handle);

        if self.settings.features.broker {
            ensure_empty(&self.broker, SubsystemKind::Broker)?;
            validated(SubsystemKind::Broker, validation::validate_broker(&self.settings.broker))?;
            let handle = build(SubsystemKind::Broker, self.provider.broker(&self.settings)).await?;
            self.broker = Some(handle);
        } else {
            skipped(SubsystemKind::Broker);
        }

        Ok(())
    }

    async fn init_search(&mut self) -> Result<(), InitError> {
        if !self.settings.features.search {
            skipped(SubsystemKind::Search);
            return Ok(());
        }

        ensure_empty(&self.search, SubsystemKind::Search)?;
        validated(SubsystemKind::Search, validation::validate_search(&self.settings.search))?;

        let sync_target = if self.settings.features.search_sync {
            let store = self.document_store.clone().ok_or(InitError::MissingDependency {
                subsystem: SubsystemKind::Search,
                requires: SubsystemKind::DocumentStore,
            })?;
            Some(store)
        } else {
            None
        };

        let handle = build(SubsystemKind::Search, self.provider.search(&self.settings)).await?;

        if let Some(store) = sync_target {
            store
                .bind_search_sync(handle.clone())
                .map_err(|source| InitError::Subsystem {
                    subsystem: SubsystemKind::Search,
                    source,
                })?;
            tracing::info!("Document store synchronized into search index");
        }

        self.search = Some(handle);
        Ok(())
    }

    async fn init_mailer(&mut self) -> Result<(), InitError> {
        if !self.settings.features.mailer {
            skipped(SubsystemKind::Mailer);
            return Ok(());
        }

        ensure_empty(&self.mailer, SubsystemKind::Mailer)?;
        let queue = self.queue.clone().ok_or(InitError::MissingDependency {
            subsystem: SubsystemKind::Mailer,
            requires: SubsystemKind::Queue,
        })?;
        validated(SubsystemKind::Mailer, validation::validate_mailer(&self.settings.mailer))?;

        let handle = build(SubsystemKind::Mailer, self.provider.mailer(&self.settings, queue)).await?;
        self.mailer = Some(handle);
        Ok(())
    }

    /// Open the accessors. Called once both init phases succeeded.
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    fn read<T: ?Sized>(&self, slot: &Option<Arc<T>>) -> Result<Option<Arc<T>>, UsageError> {
        if !self.ready {
            return Err(UsageError::NotReady);
        }
        Ok(slot.clone())
    }

    pub fn document_store(&self) -> Result<Option<Arc<dyn DocumentStore>>, UsageError> {
        self.read(&self.document_store)
    }

    pub fn search(&self) -> Result<Option<Arc<dyn SearchIndex>>, UsageError> {
        self.read(&self.search)
    }

    pub fn queue(&self) -> Result<Option<Arc<dyn Queue>>, UsageError> {
        self.read(&self.queue)
    }

    pub fn cache(&self) -> Result<Option<Arc<dyn Cache>>, UsageError> {
        self.read(&self.cache)
    }

    pub fn mailer(&self) -> Result<Option<Arc<dyn Mailer>>, UsageError> {
        self.read(&self.mailer)
    }

    pub fn listener(&self) -> Result<Option<Arc<HttpServer>>, UsageError> {
        self.read(&self.listener)
    }

    pub fn scheduler(&self) -> Result<Option<Arc<dyn Scheduler>>, UsageError> {
        self.read(&self.scheduler)
    }

    pub fn broker(&self) -> Result<Option<Arc<dyn Broker>>, UsageError> {
        self.read(&self.broker)
    }

    /// Pending `start()` calls for the go-live phase: queue, then scheduler.
    pub(crate) fn starters(&self) -> Vec<(SubsystemKind, BoxFuture<'_, Result<(), SubsystemError>>)> {
        let mut starters = Vec::new();
        if let Some(queue) = &self.queue {
            starters.push((SubsystemKind::Queue, queue.start()));
        }
        if let Some(scheduler) = &self.scheduler {
            starters.push((SubsystemKind::Scheduler, scheduler.start()));
        }
        starters
    }

    fn closers(&self) -> Vec<Closing<'_>> {
        let mut closers: Vec<Closing<'_>> = Vec::new();
        if let Some(broker) = &self.broker {
            closers.push((SubsystemKind::Broker, broker.close()));
        }
        if let Some(scheduler) = &self.scheduler {
            closers.push((SubsystemKind::Scheduler, scheduler.close()));
        }
        if let Some(listener) = &self.listener {
            closers.push((SubsystemKind::Listener, listener.close()));
        }
        if let Some(mailer) = &self.mailer {
            closers.push((SubsystemKind::Mailer, mailer.close()));
        }
        if let Some(cache) = &self.cache {
            closers.push((SubsystemKind::Cache, cache.close()));
        }
        if let Some(search) = &self.search {
            closers.push((SubsystemKind::Search, search.close()));
        }
        if let Some(queue) = &self.queue {
            closers.push((SubsystemKind::Queue, queue.close()));
        }
        if let Some(store) = &self.document_store {
            closers.push((SubsystemKind::DocumentStore, store.close()));
        }
        closers
    }

    /// Close every present handle, in reverse dependency order.
    ///
    /// Runs at most once; later calls return an empty report.
    pub async fn close(&self) -> TeardownReport {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("Container already closed");
            return TeardownReport::default();
        }

        let timeout = self.settings.lifecycle.close_timeout();
        let report = teardown::close_all(self.closers(), timeout).await;

        if report.is_clean() {
            tracing::info!(closed = report.closed.len(), "Container closed");
        } else {
            tracing::warn!(report = %report, "Container closed with failures");
        }
        report
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("document_store", &self.document_store.is_some())
            .field("search", &self.search.is_some())
            .field("queue", &self.queue.is_some())
            .field("cache", &self.cache.is_some())
            .field("mailer", &self.mailer.is_some())
            .field("listener", &self.listener.is_some())
            .field("scheduler", &self.scheduler.is_some())
            .field("broker", &self.broker.is_some())
            .field("ready", &self.ready)
            .finish()
    }
}

fn ensure_empty<T: ?Sized>(slot: &Option<Arc<T>>, kind: SubsystemKind) -> Result<(), InitError> {
    match slot {
        Some(_) => Err(InitError::AlreadyInitialized(kind)),
        None => Ok(()),
    }
}

fn validated(kind: SubsystemKind, result: Result<(), Vec<ValidationError>>) -> Result<(), InitError> {
    result.map_err(|errors| {
        tracing::error!(subsystem = %kind, errors = errors.len(), "Invalid subsystem settings");
        metrics::record_subsystem_init(kind, false);
        InitError::InvalidSettings { subsystem: kind, errors }
    })
}

fn skipped(kind: SubsystemKind) {
    tracing::debug!(subsystem = %kind, "Subsystem disabled by feature flag");
}

async fn build<T, F>(kind: SubsystemKind, init: F) -> Result<Arc<T>, InitError>
where
    T: ?Sized,
    F: Future<Output = Result<Arc<T>, SubsystemError>>,
{
    match init.await {
        Ok(handle) => {
            metrics::record_subsystem_init(kind, true);
            tracing::info!(subsystem = %kind, "Subsystem initialized");
            Ok(handle)
        }
        Err(source) => {
            metrics::record_subsystem_init(kind, false);
            tracing::error!(subsystem = %kind, error = %source, "Subsystem initialization failed");
            Err(InitError::Subsystem { subsystem: kind, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::memory::InMemoryProvider;

    fn container(settings: AppSettings) -> Container {
        Container::new(Arc::new(settings), Arc::new(InMemoryProvider::new()))
    }

    async fn initialized(settings: AppSettings) -> Container {
        let mut container = container(settings);
        container.init_mandatory().await.unwrap();
        container.init_optional().await.unwrap();
        container.mark_ready();
        container
    }

    fn full_settings() -> AppSettings {
        let mut settings = AppSettings::default();
        settings.features.document_store = true;
        settings.features.search = true;
        settings.features.search_sync = true;
        settings.features.mailer = true;
        settings.features.broker = true;
        settings.document_store.uri = "memory://local".to_string();
        settings.document_store.database = "app".to_string();
        settings.search.endpoint = "http://localhost:7700".to_string();
        settings.search.api_key = "key".to_string();
        settings.mailer.from_email = "noreply@example.com".to_string();
        settings.mailer.smtp.host = "localhost".to_string();
        settings.broker.addr = "tcp://localhost:1883".to_string();
        settings
    }

    #[tokio::test]
    async fn accessors_fail_before_ready() {
        let mut container = container(AppSettings::default());
        container.init_mandatory().await.unwrap();

        assert_eq!(container.queue().err(), Some(UsageError::NotReady));
        assert_eq!(container.cache().err(), Some(UsageError::NotReady));
    }

    #[tokio::test]
    async fn flags_off_leaves_optional_slots_empty() {
        let container = initialized(AppSettings::default()).await;

        assert!(container.document_store().unwrap().is_none());
        assert!(container.search().unwrap().is_none());
        assert!(container.mailer().unwrap().is_none());
        assert!(container.broker().unwrap().is_none());

        assert!(container.queue().unwrap().is_some());
        assert!(container.cache().unwrap().is_some());
        assert!(container.listener().unwrap().is_some());
        assert!(container.scheduler().unwrap().is_some());
    }

    #[tokio::test]
    async fn everything_enabled_fills_every_slot() {
        let container = initialized(full_settings()).await;

        assert!(container.document_store().unwrap().is_some());
        assert!(container.search().unwrap().is_some());
        assert!(container.mailer().unwrap().is_some());
        assert!(container.broker().unwrap().is_some());
    }

    #[tokio::test]
    async fn search_sync_without_document_store_is_rejected() {
        let mut settings = full_settings();
        settings.features.document_store = false;

        let mut container = container(settings);
        container.init_mandatory().await.unwrap();
        let err = container.init_optional().await.unwrap_err();

        assert!(matches!(
            err,
            InitError::MissingDependency {
                subsystem: SubsystemKind::Search,
                requires: SubsystemKind::DocumentStore,
            }
        ));
    }

    #[tokio::test]
    async fn invalid_search_settings_fail_before_connecting() {
        let mut settings = AppSettings::default();
        settings.features.search = true;

        let mut container = container(settings);
        container.init_mandatory().await.unwrap();
        let err = container.init_optional().await.unwrap_err();

        match err {
            InitError::InvalidSettings { subsystem, errors } => {
                assert_eq!(subsystem, SubsystemKind::Search);
                assert!(errors.iter().any(|e| e.field == "search.api_key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn second_init_is_rejected() {
        let mut container = container(AppSettings::default());
        container.init_mandatory().await.unwrap();

        let err = container.init_mandatory().await.unwrap_err();
        assert!(matches!(err, InitError::AlreadyInitialized(SubsystemKind::Queue)));
    }

    #[tokio::test]
    async fn close_runs_once_in_reverse_order() {
        let container = initialized(full_settings()).await;

        let report = container.close().await;
        assert!(report.is_clean());
        assert_eq!(
            report.closed,
            vec![
                SubsystemKind::Broker,
                SubsystemKind::Scheduler,
                SubsystemKind::Listener,
                SubsystemKind::Mailer,
                SubsystemKind::Cache,
                SubsystemKind::Search,
                SubsystemKind::Queue,
                SubsystemKind::DocumentStore,
            ]
        );

        let again = container.close().await;
        assert_eq!(again.attempted(), 0);
    }

    #[tokio::test]
    async fn close_shuts_the_listener_route_table() {
        let container = initialized(AppSettings::default()).await;
        let listener = container.listener().unwrap().unwrap();
        listener.route("/before", axum::routing::get(|| async { "ok" })).unwrap();

        let report = container.close().await;
        assert!(report.closed.contains(&SubsystemKind::Listener));
        assert!(listener.route("/after", axum::routing::get(|| async { "late" })).is_err());
    }

    #[tokio::test]
    async fn close_with_nothing_initialized_is_clean() {
        let container = container(AppSettings::default());
        let report = container.close().await;
        assert!(report.is_clean());
        assert_eq!(report.attempted(), 0);
    }
}
