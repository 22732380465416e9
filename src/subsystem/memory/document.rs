//! Process-local document store with optional search sync.
//!
//! Documents are keyed by collection and their `id` field. Once a
//! search index is bound, every insert is mirrored into it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::subsystem::{Closer, DocumentStore, SearchIndex, SubsystemError};

/// Collections of JSON documents keyed by id.
///
/// When search sync is bound, every insert is mirrored into the index
/// under the collection name.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<(String, String), Value>,
    search: RwLock<Option<Arc<dyn SearchIndex>>>,
    closed: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), SubsystemError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubsystemError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: &str, mut document: Value) -> Result<String, SubsystemError> {
        self.ensure_open()?;

        let id = match document.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };
        if let Value::Object(fields) = &mut document {
            fields.insert("id".to_string(), Value::String(id.clone()));
        }

        self.documents
            .insert((collection.to_string(), id.clone()), document.clone());

        let search = self.search.read().clone();
        if let Some(search) = search {
            search.index(collection, &id, document).await?;
        }

        Ok(id)
    }

    async fn find(&self, collection: &str, id: &str) -> Result<Option<Value>, SubsystemError> {
        self.ensure_open()?;
        Ok(self
            .documents
            .get(&(collection.to_string(), id.to_string()))
            .map(|doc| doc.value().clone()))
    }

    fn bind_search_sync(&self, index: Arc<dyn SearchIndex>) -> Result<(), SubsystemError> {
        let mut search = self.search.write();
        if search.is_some() {
            return Err(SubsystemError::Rejected("search sync is already bound".to_string()));
        }
        *search = Some(index);
        Ok(())
    }
}

#[async_trait]
impl Closer for MemoryDocumentStore {
    async fn close(&self) -> Result<(), SubsystemError> {
        self.closed.store(true, Ordering::Release);
        self.search.write().take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::memory::MemorySearchIndex;
    use serde_json::json;

    #[tokio::test]
    async fn insert_assigns_id_and_find_returns_it() {
        let store = MemoryDocumentStore::new();
        let id = store.insert("users", json!({"name": "ada"})).await.unwrap();

        let doc = store.find("users", &id).await.unwrap().unwrap();
        assert_eq!(doc["name"], "ada");
        assert_eq!(doc["id"], id.as_str());
        assert!(store.find("orders", &id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bound_search_receives_inserts() {
        let store = MemoryDocumentStore::new();
        let search = Arc::new(MemorySearchIndex::new());
        store.bind_search_sync(search.clone()).unwrap();

        store.insert("users", json!({"id": "u1", "name": "ada"})).await.unwrap();

        let indexed = search.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(indexed["name"], "ada");
        assert!(store.bind_search_sync(search).is_err());
    }

    #[tokio::test]
    async fn closed_store_rejects_writes() {
        let store = MemoryDocumentStore::new();
        store.close().await.unwrap();
        assert!(matches!(
            store.insert("users", json!({})).await,
            Err(SubsystemError::Closed)
        ));
    }
}
