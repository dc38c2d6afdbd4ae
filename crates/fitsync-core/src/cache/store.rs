//! Byte-level local persistence and the degrading cache wrapper.

use super::CacheEntry;
use anyhow::Result;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Local key/value byte store consumed by the cache layer.
///
/// Each key is independently atomic; no ordering is guaranteed across
/// keys and no cross-key transactions exist.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory store: tests, and ephemeral fallback when no durable cache
/// directory is available.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .iter()
            .map(|e| e.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

/// Persistence wrapper that serializes [`CacheEntry`] envelopes and treats
/// every storage failure as a cache miss.
///
/// The client must keep working with a broken cache directory, so read,
/// write, and serde errors are logged and swallowed here; callers only
/// ever see present-or-absent.
#[derive(Clone)]
pub struct CacheStore {
    local: Arc<dyn LocalStore>,
}

impl CacheStore {
    pub fn new(local: Arc<dyn LocalStore>) -> Self {
        Self { local }
    }

    pub fn put<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>) {
        let bytes = match serde_json::to_vec(entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize cache entry, skipping write");
                return;
            }
        };
        if let Err(e) = self.local.set(key, &bytes) {
            warn!(key, error = %e, "cache write failed, continuing without cache");
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let bytes = match self.local.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(key, error = %e, "corrupt cache entry, treating as miss");
                None
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.local.remove(key) {
            warn!(key, error = %e, "cache remove failed");
        }
    }

    /// Remove every key, or only those under `prefix`.
    pub fn clear(&self, prefix: Option<&str>) {
        let prefix = prefix.unwrap_or("");
        let keys = match self.local.list_keys(prefix) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix, error = %e, "cache clear failed to list keys");
                return;
            }
        };
        let count = keys.len();
        for key in keys {
            self.remove(&key);
        }
        debug!(prefix, count, "cache cleared");
    }
}
