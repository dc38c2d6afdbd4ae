//! SQLite-backed [`LocalStore`]
//!
//! One `kv_cache` table, WAL mode for concurrent readers. The row upsert
//! keeps each key independently atomic; there are no cross-key
//! transactions, matching the store contract.

use super::store::LocalStore;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Durable key/value store under a cache directory.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteStore {
    /// Create or open the cache database under `cache_dir`.
    pub fn new(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir).with_context(|| {
            format!("Failed to create cache directory: {}", cache_dir.display())
        })?;

        let db_path = cache_dir.join("fitsync-cache.db");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open cache database: {}", db_path.display()))?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL mode")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_cache (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );
            "#,
        )
        .context("Failed to create schema")?;

        debug!(path = %db_path.display(), "cache database opened");

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Database in the platform cache directory (`~/.cache/fitsync` on
    /// Linux).
    pub fn open_default() -> Result<Self> {
        let cache_dir = dirs::cache_dir()
            .context("Could not determine cache directory")?
            .join("fitsync");
        Self::new(&cache_dir)
    }
}

impl LocalStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM kv_cache WHERE key = ?",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to query cache")
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv_cache (key, value) VALUES (?, ?)",
            params![key, value],
        )
        .context("Failed to write cache entry")?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv_cache WHERE key = ?", params![key])
            .context("Failed to delete cache entry")?;
        Ok(())
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key FROM kv_cache WHERE key LIKE ? || '%'")
            .context("Failed to prepare query")?;

        let rows = stmt
            .query_map(params![prefix], |row| row.get::<_, String>(0))
            .context("Failed to query keys")?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.context("Failed to read row")?);
        }
        Ok(keys)
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        // Checkpoint so the WAL file doesn't grow unbounded across restarts
        let conn = self.conn.lock();
        if let Err(e) = conn.pragma_update(None, "wal_checkpoint", "TRUNCATE") {
            warn!("Failed to checkpoint WAL on SqliteStore drop: {}", e);
        }
    }
}
