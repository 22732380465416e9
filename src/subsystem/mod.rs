//! Subsystem capability interfaces.
//!
//! # Data Flow
//! ```text
//! SubsystemProvider (provider.rs)
//!     → init: AppSettings → Arc<dyn Capability>
//!     → stored in Container slots
//!     → Closer::close during teardown
//!     → Starter::start during go-live (queue, scheduler)
//! ```
//!
//! # Design Decisions
//! - The container never recovers concrete types; it calls lifecycle
//!   methods through `Closer` / `Starter` only
//! - Domain surface is deliberately narrow: no query syntax
//! - `memory` provides process-local implementations for the binary and tests

pub mod memory;
pub mod provider;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

pub use provider::SubsystemProvider;

/// Identifies a container slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubsystemKind {
    DocumentStore,
    Search,
    Queue,
    Cache,
    Mailer,
    Listener,
    Scheduler,
    Broker,
}

impl SubsystemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubsystemKind::DocumentStore => "document_store",
            SubsystemKind::Search => "search",
            SubsystemKind::Queue => "queue",
            SubsystemKind::Cache => "cache",
            SubsystemKind::Mailer => "mailer",
            SubsystemKind::Listener => "listener",
            SubsystemKind::Scheduler => "scheduler",
            SubsystemKind::Broker => "broker",
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by a subsystem client.
#[derive(Debug, Error)]
pub enum SubsystemError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("handle is closed")]
    Closed,

    #[error("rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Teardown capability every handle implements.
#[async_trait]
pub trait Closer: Send + Sync {
    async fn close(&self) -> Result<(), SubsystemError>;
}

/// Deferred activation, invoked once the listener is bound.
#[async_trait]
pub trait Starter: Send + Sync {
    async fn start(&self) -> Result<(), SubsystemError>;
}

#[async_trait]
pub trait DocumentStore: Closer {
    /// Insert a document and return its generated id.
    async fn insert(&self, collection: &str, document: serde_json::Value) -> Result<String, SubsystemError>;

    async fn find(&self, collection: &str, id: &str) -> Result<Option<serde_json::Value>, SubsystemError>;

    /// Mirror every subsequent write into `index`.
    fn bind_search_sync(&self, index: Arc<dyn SearchIndex>) -> Result<(), SubsystemError>;
}

#[async_trait]
pub trait SearchIndex: Closer {
    async fn index(&self, index: &str, id: &str, document: serde_json::Value) -> Result<(), SubsystemError>;

    async fn get(&self, index: &str, id: &str) -> Result<Option<serde_json::Value>, SubsystemError>;
}

/// A unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub topic: String,
    pub payload: serde_json::Value,
}

impl Job {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload,
        }
    }
}

pub type JobHandler = Arc<dyn Fn(Job) -> BoxFuture<'static, Result<(), SubsystemError>> + Send + Sync>;

/// Background job queue. Jobs enqueued before `start()` wait until the
/// worker loop is running.
#[async_trait]
pub trait Queue: Closer + Starter {
    async fn enqueue(&self, job: Job) -> Result<(), SubsystemError>;

    fn register(&self, topic: &str, handler: JobHandler) -> Result<(), SubsystemError>;
}

#[async_trait]
pub trait Cache: Closer {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SubsystemError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), SubsystemError>;

    async fn delete(&self, key: &str) -> Result<bool, SubsystemError>;
}

/// Outgoing mail. Sender fields come from the mailer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mail {
    pub to: Vec<String>,
    pub subject: String,
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
}

#[async_trait]
pub trait Mailer: Closer {
    async fn send(&self, mail: Mail) -> Result<(), SubsystemError>;
}

pub type TaskFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Periodic task runner. Tasks fire only after `start()`.
pub trait Scheduler: Closer + Starter {
    fn schedule(&self, name: &str, every: Duration, task: TaskFn) -> Result<(), SubsystemError>;
}

#[async_trait]
pub trait Broker: Closer {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SubsystemError>;

    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Vec<u8>>, SubsystemError>;
}
