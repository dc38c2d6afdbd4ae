//! Parallel cache warm-up at process start.

use crate::cache::{CollectionCache, CollectionDescriptor, STARTUP_COLLECTIONS};
use crate::error::SyncError;
use crate::sync::SyncReader;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Outcome of one warm-up pass. Collections settle independently; one
/// failing never blocks the others.
#[derive(Debug, Default)]
pub struct WarmReport {
    pub warmed: Vec<String>,
    pub failed: Vec<(String, SyncError)>,
}

impl WarmReport {
    pub fn all_warmed(&self) -> bool {
        self.failed.is_empty()
    }
}

/// What a `warm_all` caller ended up being for the current pass.
enum PassRole {
    /// Runs the pass and broadcasts its report.
    Runner(watch::Sender<Option<Arc<WarmReport>>>),
    /// Waits on a pass someone else is running.
    Waiter(watch::Receiver<Option<Arc<WarmReport>>>),
}

/// Warms every registered collection in parallel, once, even when asked
/// from several places at the same time.
pub struct Preloader {
    reader: SyncReader,
    cache: Arc<CollectionCache>,
    descriptors: Vec<CollectionDescriptor>,
    /// Receiver for the pass currently in flight, if any. Late callers
    /// wait on it instead of starting a second pass.
    inflight: Mutex<Option<watch::Receiver<Option<Arc<WarmReport>>>>>,
}

impl Preloader {
    /// Preloader over the startup collections.
    pub fn new(reader: SyncReader, cache: Arc<CollectionCache>) -> Self {
        Self::with_descriptors(reader, cache, STARTUP_COLLECTIONS.clone())
    }

    pub fn with_descriptors(
        reader: SyncReader,
        cache: Arc<CollectionCache>,
        descriptors: Vec<CollectionDescriptor>,
    ) -> Self {
        Self {
            reader,
            cache,
            descriptors,
            inflight: Mutex::new(None),
        }
    }

    /// Warm every registered collection and report per-collection results.
    ///
    /// A call arriving while a pass is running receives that pass's report
    /// when it settles; it never starts a duplicate pass.
    pub async fn warm_all(&self) -> Arc<WarmReport> {
        loop {
            // Decide under the lock whether we run the pass or ride one.
            let role = {
                let mut guard = self.inflight.lock().await;
                match guard.as_ref() {
                    Some(rx) => PassRole::Waiter(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        *guard = Some(rx);
                        PassRole::Runner(tx)
                    }
                }
            };

            match role {
                PassRole::Waiter(mut rx) => {
                    match rx.wait_for(|report| report.is_some()).await {
                        Ok(report) => {
                            if let Some(report) = report.clone() {
                                return report;
                            }
                        }
                        // Pass owner died mid-flight; clear the dead slot
                        // and take over on the next spin.
                        Err(_) => {
                            let mut guard = self.inflight.lock().await;
                            let dead = guard
                                .as_ref()
                                .map(|rx| rx.has_changed().is_err())
                                .unwrap_or(false);
                            if dead {
                                *guard = None;
                            }
                        }
                    }
                }
                PassRole::Runner(tx) => {
                    let report = Arc::new(self.run_pass().await);
                    let _ = tx.send(Some(report.clone()));
                    *self.inflight.lock().await = None;
                    return report;
                }
            }
        }
    }

    /// Drop the cached collections, then warm them again from the remote.
    pub async fn force_preload(&self) -> Arc<WarmReport> {
        debug!("forced preload: clearing collection caches");
        self.cache.clear_all();
        self.warm_all().await
    }

    async fn run_pass(&self) -> WarmReport {
        info!(
            collections = self.descriptors.len(),
            "warming collection caches"
        );

        let loads = self.descriptors.iter().map(|descriptor| async move {
            let result = self.reader.load(descriptor, false).await;
            (descriptor.name().to_string(), result)
        });

        let mut report = WarmReport::default();
        for (name, result) in join_all(loads).await {
            match result {
                Ok(_) => report.warmed.push(name),
                Err(e) => {
                    warn!(collection = %name, error = %e, "preload failed");
                    report.failed.push((name, e));
                }
            }
        }

        info!(
            warmed = report.warmed.len(),
            failed = report.failed.len(),
            "warm-up pass complete"
        );
        report
    }
}
