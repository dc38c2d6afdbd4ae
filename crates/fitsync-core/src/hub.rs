//! Keyed observer fan-out for completion updates.
//!
//! Screens subscribe with a callback and hold the returned guard; the hub
//! keeps only weak references, so a dropped guard can never be called
//! again and never leaks. Delivery is synchronous with publish: the
//! subscriber list is snapshotted first and callbacks run outside the map
//! lock, so a callback may itself subscribe or unsubscribe.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Identifies one observed exercise for one user. The day dimension is
/// implicit: published updates always describe the current day's session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompletionKey {
    pub user_id: String,
    pub exercise_id: String,
}

impl CompletionKey {
    pub fn new(user_id: impl Into<String>, exercise_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            exercise_id: exercise_id.into(),
        }
    }
}

/// Snapshot pushed to observers whenever a session aggregate changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionUpdate {
    pub user_id: String,
    pub exercise_id: String,
    pub session_id: Option<String>,
    pub completed_sets: BTreeSet<u32>,
    pub total_sets: u32,
    pub is_complete: bool,
}

pub type ObserverCallback = dyn Fn(&CompletionUpdate) + Send + Sync;

struct Subscriber {
    id: u64,
    callback: Weak<ObserverCallback>,
}

/// Keeps a subscription alive. Dropping it (or calling
/// [`unsubscribe`](Subscription::unsubscribe)) detaches the callback.
pub struct Subscription {
    key: CompletionKey,
    id: u64,
    /// The only strong reference to the callback; the hub never extends
    /// its lifetime.
    _callback: Arc<ObserverCallback>,
    hub: Weak<ObserverHub>,
}

impl Subscription {
    pub fn key(&self) -> &CompletionKey {
        &self.key
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.detach(&self.key, self.id);
        }
    }
}

/// Fan-out registry, keyed by `(user, exercise)`.
pub struct ObserverHub {
    subscribers: DashMap<CompletionKey, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl ObserverHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(0),
        })
    }

    /// Register `callback` for updates to `key`.
    pub fn subscribe(
        self: &Arc<Self>,
        key: CompletionKey,
        callback: impl Fn(&CompletionUpdate) + Send + Sync + 'static,
    ) -> Subscription {
        let callback: Arc<ObserverCallback> = Arc::new(callback);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(key.clone())
            .or_default()
            .push(Subscriber {
                id,
                callback: Arc::downgrade(&callback),
            });
        trace!(
            user = %key.user_id,
            exercise = %key.exercise_id,
            id,
            "observer subscribed"
        );
        Subscription {
            key,
            id,
            _callback: callback,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver `update` to every live subscriber for `key`, in
    /// subscription order, synchronously.
    pub fn publish(&self, key: &CompletionKey, update: &CompletionUpdate) {
        let callbacks: Vec<Arc<ObserverCallback>> = match self.subscribers.get_mut(key) {
            Some(mut subscribers) => {
                // Prune entries whose guard is gone, then snapshot.
                subscribers.retain(|s| s.callback.strong_count() > 0);
                subscribers
                    .iter()
                    .filter_map(|s| s.callback.upgrade())
                    .collect()
            }
            None => return,
        };

        trace!(
            user = %key.user_id,
            exercise = %key.exercise_id,
            observers = callbacks.len(),
            "publishing completion update"
        );
        for callback in callbacks {
            callback(update);
        }
    }

    fn detach(&self, key: &CompletionKey, id: u64) {
        if let Some(mut subscribers) = self.subscribers.get_mut(key) {
            subscribers.retain(|s| s.id != id);
        }
        self.subscribers
            .remove_if(key, |_, subscribers| subscribers.is_empty());
    }

    /// Live observers currently attached to `key`.
    pub fn observer_count(&self, key: &CompletionKey) -> usize {
        self.subscribers
            .get(key)
            .map(|subscribers| {
                subscribers
                    .iter()
                    .filter(|s| s.callback.strong_count() > 0)
                    .count()
            })
            .unwrap_or(0)
    }
}
