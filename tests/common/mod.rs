//! Shared utilities for lifecycle integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use app_orchestrator::config::AppSettings;
use app_orchestrator::subsystem::{
    Broker, Cache, Closer, DocumentStore, Job, JobHandler, Mail, Mailer, Queue, Scheduler, SearchIndex, Starter,
    SubsystemError, SubsystemKind, SubsystemProvider, TaskFn,
};
use app_orchestrator::App;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

/// Settings bound to an ephemeral local port with short deadlines.
pub fn test_settings() -> AppSettings {
    let mut settings = AppSettings::default();
    settings.http.host = "127.0.0.1".to_string();
    settings.http.port = 0;
    settings.http.shutdown_timeout_secs = 2;
    settings.lifecycle.close_timeout_secs = 1;
    settings
}

/// Ordered record of provider and handle calls, e.g. `init:queue`.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.events().into_iter().filter(|e| e.starts_with(prefix)).collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }
}

/// Which calls should misbehave.
#[derive(Clone, Default)]
pub struct Faults {
    pub fail_init: Option<SubsystemKind>,
    pub fail_start: Option<SubsystemKind>,
    pub fail_close: Option<SubsystemKind>,
    pub hang_close: Option<SubsystemKind>,
}

/// Provider whose handles only record what the container asks of them.
#[derive(Clone, Default)]
pub struct RecordingProvider {
    pub log: EventLog,
    pub faults: Faults,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faults(faults: Faults) -> Self {
        Self {
            log: EventLog::default(),
            faults,
        }
    }

    fn make(&self, kind: SubsystemKind) -> Result<Arc<FakeHandle>, SubsystemError> {
        self.log.push(format!("init:{}", kind));
        if self.faults.fail_init == Some(kind) {
            return Err(SubsystemError::Unavailable(format!("{} refused connection", kind)));
        }
        Ok(Arc::new(FakeHandle {
            kind,
            log: self.log.clone(),
            faults: self.faults.clone(),
        }))
    }
}

#[async_trait]
impl SubsystemProvider for RecordingProvider {
    async fn document_store(&self, _: &AppSettings) -> Result<Arc<dyn DocumentStore>, SubsystemError> {
        Ok(self.make(SubsystemKind::DocumentStore)?)
    }

    async fn search(&self, _: &AppSettings) -> Result<Arc<dyn SearchIndex>, SubsystemError> {
        Ok(self.make(SubsystemKind::Search)?)
    }

    async fn queue(&self, _: &AppSettings) -> Result<Arc<dyn Queue>, SubsystemError> {
        Ok(self.make(SubsystemKind::Queue)?)
    }

    async fn cache(&self, _: &AppSettings) -> Result<Arc<dyn Cache>, SubsystemError> {
        Ok(self.make(SubsystemKind::Cache)?)
    }

    async fn mailer(&self, _: &AppSettings, _queue: Arc<dyn Queue>) -> Result<Arc<dyn Mailer>, SubsystemError> {
        Ok(self.make(SubsystemKind::Mailer)?)
    }

    async fn scheduler(&self, _: &AppSettings) -> Result<Arc<dyn Scheduler>, SubsystemError> {
        Ok(self.make(SubsystemKind::Scheduler)?)
    }

    async fn broker(&self, _: &AppSettings) -> Result<Arc<dyn Broker>, SubsystemError> {
        Ok(self.make(SubsystemKind::Broker)?)
    }
}

pub struct FakeHandle {
    kind: SubsystemKind,
    log: EventLog,
    faults: Faults,
}

#[async_trait]
impl Closer for FakeHandle {
    async fn close(&self) -> Result<(), SubsystemError> {
        self.log.push(format!("close:{}", self.kind));
        if self.faults.hang_close == Some(self.kind) {
            futures_util::future::pending::<()>().await;
        }
        if self.faults.fail_close == Some(self.kind) {
            return Err(SubsystemError::Unavailable("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Starter for FakeHandle {
    async fn start(&self) -> Result<(), SubsystemError> {
        self.log.push(format!("start:{}", self.kind));
        if self.faults.fail_start == Some(self.kind) {
            return Err(SubsystemError::Unavailable("worker pool refused to start".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FakeHandle {
    async fn insert(&self, _collection: &str, _document: Value) -> Result<String, SubsystemError> {
        Ok("fake".to_string())
    }

    async fn find(&self, _collection: &str, _id: &str) -> Result<Option<Value>, SubsystemError> {
        Ok(None)
    }

    fn bind_search_sync(&self, _index: Arc<dyn SearchIndex>) -> Result<(), SubsystemError> {
        self.log.push("bind:search_sync");
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for FakeHandle {
    async fn index(&self, _index: &str, _id: &str, _document: Value) -> Result<(), SubsystemError> {
        Ok(())
    }

    async fn get(&self, _index: &str, _id: &str) -> Result<Option<Value>, SubsystemError> {
        Ok(None)
    }
}

#[async_trait]
impl Queue for FakeHandle {
    async fn enqueue(&self, _job: Job) -> Result<(), SubsystemError> {
        Ok(())
    }

    fn register(&self, _topic: &str, _handler: JobHandler) -> Result<(), SubsystemError> {
        Ok(())
    }
}

#[async_trait]
impl Cache for FakeHandle {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, SubsystemError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> Result<(), SubsystemError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<bool, SubsystemError> {
        Ok(false)
    }
}

#[async_trait]
impl Mailer for FakeHandle {
    async fn send(&self, _mail: Mail) -> Result<(), SubsystemError> {
        Ok(())
    }
}

impl Scheduler for FakeHandle {
    fn schedule(&self, _name: &str, _every: Duration, _task: TaskFn) -> Result<(), SubsystemError> {
        Ok(())
    }
}

#[async_trait]
impl Broker for FakeHandle {
    async fn publish(&self, _topic: &str, _payload: Vec<u8>) -> Result<(), SubsystemError> {
        Ok(())
    }

    fn subscribe(&self, _topic: &str) -> Result<broadcast::Receiver<Vec<u8>>, SubsystemError> {
        Ok(broadcast::channel(1).1)
    }
}

/// Wait until the app publishes its bound address.
pub async fn wait_live(app: &App) -> SocketAddr {
    let mut live = app.subscribe_live();
    let addr = *tokio::time::timeout(Duration::from_secs(5), live.wait_for(|addr| addr.is_some()))
        .await
        .expect("app did not go live in time")
        .expect("app dropped before going live");
    addr.expect("address published")
}
