//! In-memory remote fake shared by the unit tests.

use crate::error::SyncError;
use crate::remote::{Document, RemoteSource, StoredDocument};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Scriptable [`RemoteSource`]: seedable documents and collection
/// payloads, failure toggles, call counting, and an optional fetch delay
/// (driven by the paused tokio clock) for in-flight overlap tests.
#[derive(Default)]
pub struct FakeRemote {
    collections: Mutex<HashMap<String, Value>>,
    documents: Mutex<HashMap<String, Vec<StoredDocument>>>,
    next_id: AtomicUsize,
    fetch_calls: Mutex<HashMap<String, usize>>,
    pub fail_fetches: AtomicBool,
    pub fail_queries: AtomicBool,
    pub fail_inserts: AtomicBool,
    pub fetch_delay: Mutex<Option<Duration>>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_collection(&self, name: &str, payload: Value) {
        self.collections.lock().insert(name.to_string(), payload);
    }

    pub fn seed_document(&self, collection: &str, fields: Document) -> String {
        let id = format!("doc-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.documents
            .lock()
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                fields,
            });
        id
    }

    pub fn fetch_count(&self, collection: &str) -> usize {
        self.fetch_calls
            .lock()
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    pub fn documents_in(&self, collection: &str) -> Vec<StoredDocument> {
        self.documents
            .lock()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn query_equal(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<StoredDocument>, SyncError> {
        if self.fail_queries.load(Ordering::Relaxed) {
            return Err(SyncError::remote("query refused"));
        }
        Ok(self
            .documents
            .lock()
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.fields.get(field) == Some(value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<String, SyncError> {
        if self.fail_inserts.load(Ordering::Relaxed) {
            return Err(SyncError::remote("insert refused"));
        }
        Ok(self.seed_document(collection, document))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), SyncError> {
        if let Some(docs) = self.documents.lock().get_mut(collection) {
            docs.retain(|d| d.id != id);
        }
        Ok(())
    }

    async fn fetch_collection(&self, collection: &str) -> Result<Value, SyncError> {
        *self
            .fetch_calls
            .lock()
            .entry(collection.to_string())
            .or_insert(0) += 1;

        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_fetches.load(Ordering::Relaxed) {
            return Err(SyncError::remote("backend offline"));
        }
        self.collections
            .lock()
            .get(collection)
            .cloned()
            .ok_or_else(|| SyncError::remote(format!("no such collection: {collection}")))
    }
}
