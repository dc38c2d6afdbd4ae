//! Typed per-collection cache with the validity policy.

use super::store::CacheStore;
use super::{CacheEntry, CollectionDescriptor, COLLECTION_KEY_PREFIX};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Owns the two-part validity invariant: schema version and TTL.
///
/// Presence and validity are distinct. An expired entry is still returned
/// by [`read`](CollectionCache::read) so the UI can show last-known data
/// while a refresh runs. A schema-version mismatch is different: the
/// payload shape can no longer be trusted, so the entry reads as absent
/// and is removed on the spot.
pub struct CollectionCache {
    store: CacheStore,
}

impl CollectionCache {
    pub fn new(store: CacheStore) -> Self {
        Self { store }
    }

    /// Read the entry for `descriptor`, expired or not. Returns `None`
    /// (and deletes the entry) when it was written under another schema
    /// version.
    pub fn read<T: DeserializeOwned>(
        &self,
        descriptor: &CollectionDescriptor,
    ) -> Option<CacheEntry<T>> {
        let entry: CacheEntry<T> = self.store.get(&descriptor.cache_key())?;
        if entry.schema_version != descriptor.schema_version() {
            debug!(
                collection = descriptor.name(),
                stored = %entry.schema_version,
                current = descriptor.schema_version(),
                "schema version mismatch, dropping stale entry"
            );
            self.invalidate(descriptor);
            return None;
        }
        Some(entry)
    }

    /// Write `payload`, stamped with the current time and the descriptor's
    /// schema version.
    pub fn write<T: Serialize>(
        &self,
        descriptor: &CollectionDescriptor,
        payload: T,
    ) -> CacheEntry<T> {
        let entry = CacheEntry {
            payload,
            written_at: Utc::now(),
            schema_version: descriptor.schema_version().to_string(),
        };
        self.store.put(&descriptor.cache_key(), &entry);
        debug!(collection = descriptor.name(), "cache entry written");
        entry
    }

    /// Full validity check: present, current schema version, within TTL.
    pub fn is_valid(&self, descriptor: &CollectionDescriptor) -> bool {
        self.read::<serde_json::Value>(descriptor)
            .map(|entry| entry.is_fresh(descriptor.ttl(), Utc::now()))
            .unwrap_or(false)
    }

    pub fn invalidate(&self, descriptor: &CollectionDescriptor) {
        self.store.remove(&descriptor.cache_key());
    }

    /// Drop every collection entry, leaving unrelated keys in the store.
    pub fn clear_all(&self) {
        self.store.clear(Some(COLLECTION_KEY_PREFIX));
    }
}
