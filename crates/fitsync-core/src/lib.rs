//! fitsync-core - Local cache and synchronization core for the fitsync client
//!
//! Serves previously-fetched collections with staleness control, refreshes
//! them in the background against the remote document store, and tracks
//! idempotent workout completions with per-day dedup and live observer
//! fan-out.

pub mod cache;
pub mod completion;
pub mod engine;
pub mod error;
pub mod hub;
pub mod preload;
pub mod remote;
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{
    CacheEntry, CacheStore, CollectionCache, CollectionDescriptor, LocalStore, MemoryStore,
    SqliteStore,
};
pub use completion::{
    CompletionRecord, CompletionRequest, CompletionTracker, SessionAggregate, SessionState,
};
pub use engine::SyncEngine;
pub use error::SyncError;
pub use hub::{CompletionKey, CompletionUpdate, ObserverHub, Subscription};
pub use preload::{Preloader, WarmReport};
pub use remote::{Document, HttpRemote, RemoteSource, StoredDocument};
pub use sync::SyncReader;
