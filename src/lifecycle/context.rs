//! Accessor surface handed to application code.
//!
//! # Responsibilities
//! - Expose the initialized subsystems, the settings snapshot and the app span
//! - Report `UsageError::NotReady` until the container is ready
//!
//! # Design Decisions
//! - Cheap to clone: one `Arc<Container>` plus a span handle
//! - A disabled subsystem reads as `Ok(None)`, never as an error

use std::sync::Arc;

use crate::config::AppSettings;
use crate::container::Container;
use crate::error::UsageError;
use crate::http::HttpServer;
use crate::subsystem::{Broker, Cache, DocumentStore, Mailer, Queue, Scheduler, SearchIndex};

/// Cloneable accessor surface handed to application code.
///
/// Every accessor is a pure read: `Ok(None)` means the subsystem is
/// disabled by its feature flag.
#[derive(Clone)]
pub struct AppContext {
    container: Arc<Container>,
    span: tracing::Span,
}

impl AppContext {
    pub(crate) fn new(container: Arc<Container>, span: tracing::Span) -> Self {
        Self { container, span }
    }

    pub(crate) fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// The configuration snapshot.
    pub fn config(&self) -> &AppSettings {
        self.container.settings()
    }

    /// The app's root span. Enter it (or `instrument` with it) to tag
    /// events with the app identity.
    pub fn logger(&self) -> &tracing::Span {
        &self.span
    }

    pub fn document_store(&self) -> Result<Option<Arc<dyn DocumentStore>>, UsageError> {
        self.container.document_store()
    }

    pub fn search(&self) -> Result<Option<Arc<dyn SearchIndex>>, UsageError> {
        self.container.search()
    }

    pub fn queue(&self) -> Result<Option<Arc<dyn Queue>>, UsageError> {
        self.container.queue()
    }

    pub fn cache(&self) -> Result<Option<Arc<dyn Cache>>, UsageError> {
        self.container.cache()
    }

    pub fn mailer(&self) -> Result<Option<Arc<dyn Mailer>>, UsageError> {
        self.container.mailer()
    }

    pub fn listener(&self) -> Result<Option<Arc<HttpServer>>, UsageError> {
        self.container.listener()
    }

    pub fn scheduler(&self) -> Result<Option<Arc<dyn Scheduler>>, UsageError> {
        self.container.scheduler()
    }

    pub fn broker(&self) -> Result<Option<Arc<dyn Broker>>, UsageError> {
        self.container.broker()
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext").field("container", &self.container).finish()
    }
}
