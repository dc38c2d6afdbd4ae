//! Collection cache: versioned, TTL-bound persistence for remote data
//!
//! Three layers, leaf-first:
//! - [`LocalStore`]: byte-level key/value persistence (SQLite or in-memory)
//! - [`CacheStore`]: serde envelope, storage failures degrade to miss
//! - [`CollectionCache`]: per-collection validity (schema version + TTL)
//!
//! Invalidation:
//! - TTL expiry: entry stays readable (last-known data) but reports invalid
//! - Schema version mismatch: entry reads as absent and is deleted on the
//!   spot, so stale-format data self-heals without a migration step
//! - Explicit invalidate/clear: physical removal

mod collection;
mod sqlite;
mod store;

pub use collection::CollectionCache;
pub use sqlite::SqliteStore;
pub use store::{CacheStore, LocalStore, MemoryStore};

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Current cache schema version.
///
/// **IMPORTANT**: bump this when a cached payload shape changes; entries
/// written under an older version are dropped on first read.
///
/// Version History:
/// - v1: initial layout
/// - v2: nutrition snapshots keyed per date
/// - v3: exercise catalog entries carry muscle-group tags
/// - v4: recipe macros stored per serving instead of per 100g
pub const SCHEMA_VERSION: &str = "4";

/// Catalog collections change rarely.
pub const CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Profile, goal, and per-date snapshots are far more volatile.
pub const SNAPSHOT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Key prefix for all collection entries; lets a forced preload clear the
/// whole namespace without touching unrelated keys.
pub(crate) const COLLECTION_KEY_PREFIX: &str = "collection:";

/// A cached payload with its provenance stamp.
///
/// Payload, timestamp, and version travel in one envelope so the validity
/// check is atomic relative to reading the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub written_at: DateTime<Utc>,
    pub schema_version: String,
}

impl<T> CacheEntry<T> {
    /// TTL check against an explicit clock. A `written_at` ahead of `now`
    /// (device clock skew) counts as fresh.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.written_at).to_std() {
            Ok(age) => age <= ttl,
            Err(_) => true,
        }
    }
}

/// Static per-collection policy: name, TTL, schema version.
///
/// Immutable after construction; build one through the named constructors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescriptor {
    name: String,
    ttl: Duration,
    schema_version: &'static str,
}

impl CollectionDescriptor {
    fn new(name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            name: name.into(),
            ttl,
            schema_version: SCHEMA_VERSION,
        }
    }

    /// Exercise catalog.
    pub fn exercises() -> Self {
        Self::new("exercises", CATALOG_TTL)
    }

    /// Recipe catalog.
    pub fn recipes() -> Self {
        Self::new("recipes", CATALOG_TTL)
    }

    /// User profile snapshot.
    pub fn profile() -> Self {
        Self::new("profile", SNAPSHOT_TTL)
    }

    /// Current nutrition goal.
    pub fn nutrition_goal() -> Self {
        Self::new("nutrition_goal", SNAPSHOT_TTL)
    }

    /// Nutrition log snapshot for one calendar day.
    pub fn nutrition_log(date: NaiveDate) -> Self {
        Self::new(format!("nutrition_log:{date}"), SNAPSHOT_TTL)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn schema_version(&self) -> &'static str {
        self.schema_version
    }

    /// Key under which this collection's entry is persisted.
    pub fn cache_key(&self) -> String {
        format!("{COLLECTION_KEY_PREFIX}{}", self.name)
    }
}

/// The collections warmed at process start.
pub static STARTUP_COLLECTIONS: Lazy<Vec<CollectionDescriptor>> = Lazy::new(|| {
    vec![
        CollectionDescriptor::exercises(),
        CollectionDescriptor::recipes(),
        CollectionDescriptor::profile(),
        CollectionDescriptor::nutrition_goal(),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry_written_at(written_at: DateTime<Utc>) -> CacheEntry<u32> {
        CacheEntry {
            payload: 7,
            written_at,
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }

    #[test]
    fn test_ttl_boundary() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let entry = entry_written_at(t0);
        let ttl = SNAPSHOT_TTL; // 2h

        assert!(entry.is_fresh(ttl, t0 + chrono::Duration::minutes(119)));
        assert!(!entry.is_fresh(ttl, t0 + chrono::Duration::minutes(121)));
    }

    #[test]
    fn test_clock_skew_counts_as_fresh() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let entry = entry_written_at(now + chrono::Duration::hours(5));
        assert!(entry.is_fresh(SNAPSHOT_TTL, now));
    }

    #[test]
    fn test_descriptor_cache_keys() {
        assert_eq!(
            CollectionDescriptor::exercises().cache_key(),
            "collection:exercises"
        );

        let date = chrono::NaiveDate::from_ymd_opt(2026, 8, 8).unwrap();
        assert_eq!(
            CollectionDescriptor::nutrition_log(date).cache_key(),
            "collection:nutrition_log:2026-08-08"
        );
    }

    #[test]
    fn test_ttl_per_volatility() {
        assert_eq!(CollectionDescriptor::exercises().ttl(), CATALOG_TTL);
        assert_eq!(CollectionDescriptor::recipes().ttl(), CATALOG_TTL);
        assert_eq!(CollectionDescriptor::profile().ttl(), SNAPSHOT_TTL);
        assert_eq!(CollectionDescriptor::nutrition_goal().ttl(), SNAPSHOT_TTL);
    }

    #[test]
    fn test_startup_collections_are_the_static_four() {
        let names: Vec<_> = STARTUP_COLLECTIONS.iter().map(|d| d.name()).collect();
        assert_eq!(
            names,
            vec!["exercises", "recipes", "profile", "nutrition_goal"]
        );
    }
}
