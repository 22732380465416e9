use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use crate::subsystem::{Closer, SearchIndex, SubsystemError};

#[derive(Default)]
pub struct MemorySearchIndex {
    documents: DashMap<(String, String), Value>,
    closed: AtomicBool,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn index(&self, index: &str, id: &str, document: Value) -> Result<(), SubsystemError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubsystemError::Closed);
        }
        self.documents.insert((index.to_string(), id.to_string()), document);
        Ok(())
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>, SubsystemError> {
        Ok(self
            .documents
            .get(&(index.to_string(), id.to_string()))
            .map(|doc| doc.value().clone()))
    }
}

#[async_trait]
impl Closer for MemorySearchIndex {
    async fn close(&self) -> Result<(), SubsystemError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
