//! Stale-while-revalidate read path for cached collections.
//!
//! A screen asking for data gets whatever the cache holds, immediately and
//! without touching the network; freshness is restored by a background
//! fetch that writes through the cache. Perceived load time comes from the
//! previous session, correctness from eventual refresh.

use crate::cache::{CollectionCache, CollectionDescriptor};
use crate::error::SyncError;
use crate::remote::{bounded, RemoteSource};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// The refresh-ahead reader.
///
/// Cheap to clone; clones share the cache, the remote, and the in-flight
/// fetch table.
#[derive(Clone)]
pub struct SyncReader {
    inner: Arc<ReaderInner>,
}

struct ReaderInner {
    cache: Arc<CollectionCache>,
    remote: Arc<dyn RemoteSource>,
    /// One in-flight fetch per cache key; late callers subscribe to it
    /// instead of issuing their own.
    inflight: DashMap<String, broadcast::Sender<Result<Value, SyncError>>>,
    /// Cache keys refreshed (or scheduled) at least once this process.
    primed: DashSet<String>,
}

impl SyncReader {
    pub fn new(cache: Arc<CollectionCache>, remote: Arc<dyn RemoteSource>) -> Self {
        Self {
            inner: Arc::new(ReaderInner {
                cache,
                remote,
                inflight: DashMap::new(),
                primed: DashSet::new(),
            }),
        }
    }

    /// Load a collection.
    ///
    /// With a cached entry present this returns synchronously, stale data
    /// included, and revalidates in the background when the entry is
    /// expired or the collection hasn't been refreshed yet this process.
    /// Without one, the caller rides the shared fetch and sees its typed
    /// error on failure. `force_refresh` skips the cache entirely and
    /// overwrites it on success.
    pub async fn load(
        &self,
        descriptor: &CollectionDescriptor,
        force_refresh: bool,
    ) -> Result<Value, SyncError> {
        if force_refresh {
            return self.refresh(descriptor).await;
        }

        if let Some(entry) = self.inner.cache.read::<Value>(descriptor) {
            let fresh = entry.is_fresh(descriptor.ttl(), Utc::now());
            let first_load = !self.inner.primed.contains(&descriptor.cache_key());
            if !fresh || first_load {
                self.spawn_refresh(descriptor);
            }
            return Ok(entry.payload);
        }

        self.refresh(descriptor).await
    }

    /// Typed convenience over [`load`](Self::load).
    pub async fn load_as<T: DeserializeOwned>(
        &self,
        descriptor: &CollectionDescriptor,
        force_refresh: bool,
    ) -> Result<T, SyncError> {
        let value = self.load(descriptor, force_refresh).await?;
        serde_json::from_value(value)
            .map_err(|e| SyncError::decode(descriptor.name(), e.to_string()))
    }

    /// Kick a background refresh; the result only lands in the cache.
    fn spawn_refresh(&self, descriptor: &CollectionDescriptor) {
        self.inner.primed.insert(descriptor.cache_key());
        let _ = self.subscribe_or_start(descriptor);
    }

    /// Await the (deduplicated) refresh for `descriptor`.
    async fn refresh(&self, descriptor: &CollectionDescriptor) -> Result<Value, SyncError> {
        self.inner.primed.insert(descriptor.cache_key());
        let mut rx = self.subscribe_or_start(descriptor);
        match rx.recv().await {
            Ok(result) => result,
            // Sender dropped without a result: the fetch task died.
            Err(_) => Err(SyncError::remote("refresh task aborted")),
        }
    }

    /// Subscribe to the in-flight fetch for `descriptor`, starting one if
    /// none is running. The map entry is removed before the result is
    /// broadcast, so everyone subscribed before completion is served and
    /// anyone arriving later starts a fresh fetch.
    fn subscribe_or_start(
        &self,
        descriptor: &CollectionDescriptor,
    ) -> broadcast::Receiver<Result<Value, SyncError>> {
        let mut started: Option<broadcast::Sender<Result<Value, SyncError>>> = None;
        let rx = match self.inner.inflight.entry(descriptor.cache_key()) {
            Entry::Occupied(slot) => slot.get().subscribe(),
            Entry::Vacant(slot) => {
                let (tx, rx) = broadcast::channel(1);
                slot.insert(tx.clone());
                started = Some(tx);
                rx
            }
        };

        if let Some(tx) = started {
            let reader = self.clone();
            let descriptor = descriptor.clone();
            tokio::spawn(async move {
                let result = reader.fetch_and_store(&descriptor).await;
                reader.inner.inflight.remove(&descriptor.cache_key());
                let _ = tx.send(result);
            });
        }
        rx
    }

    async fn fetch_and_store(&self, descriptor: &CollectionDescriptor) -> Result<Value, SyncError> {
        debug!(collection = descriptor.name(), "refreshing from remote");
        match bounded(
            descriptor.name(),
            self.inner.remote.fetch_collection(descriptor.name()),
        )
        .await
        {
            Ok(payload) => {
                self.inner.cache.write(descriptor, &payload);
                debug!(collection = descriptor.name(), "refresh complete");
                Ok(payload)
            }
            Err(e) => {
                // A failed refresh never clobbers the previous entry.
                warn!(
                    collection = descriptor.name(),
                    error = %e,
                    "refresh failed, keeping last cached value"
                );
                Err(e)
            }
        }
    }
}
