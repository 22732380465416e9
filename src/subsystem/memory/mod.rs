//! Process-local subsystem implementations.
//!
//! Lets the binary and the test suite run without external services.
//! Every handle honors the same lifecycle contract as a networked client:
//! `start()` once, `close()` stops background work.

mod broker;
mod cache;
mod document;
mod mailer;
mod queue;
mod scheduler;
mod search;

pub use broker::MemoryBroker;
pub use cache::MemoryCache;
pub use document::MemoryDocumentStore;
pub use mailer::{MemoryMailer, MAIL_TOPIC};
pub use queue::MemoryQueue;
pub use scheduler::MemoryScheduler;
pub use search::MemorySearchIndex;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppSettings;
use crate::subsystem::provider::SubsystemProvider;
use crate::subsystem::{Broker, Cache, DocumentStore, Mailer, Queue, Scheduler, SearchIndex, SubsystemError};

#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryProvider;

impl InMemoryProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SubsystemProvider for InMemoryProvider {
    async fn document_store(&self, settings: &AppSettings) -> Result<Arc<dyn DocumentStore>, SubsystemError> {
        tracing::debug!(database = %settings.document_store.database, "Opening in-memory document store");
        Ok(Arc::new(MemoryDocumentStore::new()))
    }

    async fn search(&self, _settings: &AppSettings) -> Result<Arc<dyn SearchIndex>, SubsystemError> {
        Ok(Arc::new(MemorySearchIndex::new()))
    }

    async fn queue(&self, settings: &AppSettings) -> Result<Arc<dyn Queue>, SubsystemError> {
        Ok(Arc::new(MemoryQueue::new(settings.queue.clone())))
    }

    async fn cache(&self, _settings: &AppSettings) -> Result<Arc<dyn Cache>, SubsystemError> {
        Ok(Arc::new(MemoryCache::new()))
    }

    async fn mailer(&self, settings: &AppSettings, queue: Arc<dyn Queue>) -> Result<Arc<dyn Mailer>, SubsystemError> {
        Ok(Arc::new(MemoryMailer::new(&settings.mailer, queue)?))
    }

    async fn scheduler(&self, _settings: &AppSettings) -> Result<Arc<dyn Scheduler>, SubsystemError> {
        Ok(Arc::new(MemoryScheduler::new()))
    }

    async fn broker(&self, settings: &AppSettings) -> Result<Arc<dyn Broker>, SubsystemError> {
        Ok(Arc::new(MemoryBroker::new(settings.broker.client_id.clone())))
    }
}
