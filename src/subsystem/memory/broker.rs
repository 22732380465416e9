//! In-process message broker.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::subsystem::{Broker, Closer, SubsystemError};

const TOPIC_CAPACITY: usize = 256;

/// Per-topic fan-out. Messages published with no subscriber are dropped.
pub struct MemoryBroker {
    client_id: String,
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryBroker {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            topics: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), SubsystemError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubsystemError::Closed);
        }
        let delivered = match self.topics.get(topic) {
            Some(tx) => tx.send(payload).unwrap_or(0),
            None => 0,
        };
        tracing::trace!(client_id = %self.client_id, topic, delivered, "Message published");
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Vec<u8>>, SubsystemError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubsystemError::Closed);
        }
        let rx = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();
        Ok(rx)
    }
}

#[async_trait]
impl Closer for MemoryBroker {
    async fn close(&self) -> Result<(), SubsystemError> {
        self.closed.store(true, Ordering::Release);
        self.topics.clear();
        Ok(())
    }
}
