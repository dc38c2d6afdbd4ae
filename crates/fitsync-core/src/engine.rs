//! Construction glue: wires the cache, reader, preloader, tracker, and hub.
//!
//! Nothing in this crate is a global; the embedding process builds one
//! engine at startup from its two injected backends and hands the pieces
//! to whoever needs them.

use crate::cache::{CacheStore, CollectionCache, LocalStore};
use crate::completion::CompletionTracker;
use crate::hub::ObserverHub;
use crate::preload::Preloader;
use crate::remote::RemoteSource;
use crate::sync::SyncReader;
use std::sync::Arc;
use tracing::debug;

/// The assembled sync core.
pub struct SyncEngine {
    pub cache: Arc<CollectionCache>,
    pub reader: SyncReader,
    pub preloader: Arc<Preloader>,
    pub tracker: Arc<CompletionTracker>,
    pub hub: Arc<ObserverHub>,
}

impl SyncEngine {
    pub fn new(local: Arc<dyn LocalStore>, remote: Arc<dyn RemoteSource>) -> Self {
        let cache = Arc::new(CollectionCache::new(CacheStore::new(local)));
        let reader = SyncReader::new(cache.clone(), remote.clone());
        let preloader = Arc::new(Preloader::new(reader.clone(), cache.clone()));
        let hub = ObserverHub::new();
        let tracker = Arc::new(CompletionTracker::new(remote, hub.clone()));
        debug!("sync engine constructed");

        Self {
            cache,
            reader,
            preloader,
            tracker,
            hub,
        }
    }
}
