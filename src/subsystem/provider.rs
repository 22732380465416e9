//! The `init()` seam between the container and subsystem clients.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppSettings;
use crate::subsystem::{Broker, Cache, DocumentStore, Mailer, Queue, Scheduler, SearchIndex, SubsystemError};

/// Constructs subsystem handles.
///
/// The container decides *whether* and *when* each constructor runs; the
/// provider only knows *how* to connect. Implementations should return an
/// error rather than a half-connected handle.
#[async_trait]
pub trait SubsystemProvider: Send + Sync {
    async fn document_store(&self, settings: &AppSettings) -> Result<Arc<dyn DocumentStore>, SubsystemError>;

    async fn search(&self, settings: &AppSettings) -> Result<Arc<dyn SearchIndex>, SubsystemError>;

    async fn queue(&self, settings: &AppSettings) -> Result<Arc<dyn Queue>, SubsystemError>;

    async fn cache(&self, settings: &AppSettings) -> Result<Arc<dyn Cache>, SubsystemError>;

    /// The mailer delivers through the already-initialized queue.
    async fn mailer(&self, settings: &AppSettings, queue: Arc<dyn Queue>) -> Result<Arc<dyn Mailer>, SubsystemError>;

    async fn scheduler(&self, settings: &AppSettings) -> Result<Arc<dyn Scheduler>, SubsystemError>;

    async fn broker(&self, settings: &AppSettings) -> Result<Arc<dyn Broker>, SubsystemError>;
}
