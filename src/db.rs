use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::errors::StoreError;
use crate::store::{now_epoch, resolve_range, KeyValueStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    expires_at REAL
);

CREATE TABLE IF NOT EXISTS list_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_list_items_key ON list_items(key);
"#;

/// Default database filename, stored in the working directory.
pub const DB_FILE: &str = ".cachet.db";

/// Counts reported by [`SqliteStore::stats`].
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub num_entries: usize,
    pub num_lists: usize,
    pub num_list_items: usize,
}

/// File-backed store over SQLite. The connection sits behind a mutex, which
/// serializes the read-modify-write inside `incr` and keeps appends atomic
/// per key.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open or create the store at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).context("Failed to open store database")?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;",
        )
        .context("Failed to set pragmas")?;
        conn.execute_batch(SCHEMA)
            .context("Failed to create schema")?;
        tracing::debug!(path = %path.as_ref().display(), "opened sqlite store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for tests and benchmarks).
    #[doc(hidden)]
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("store mutex poisoned"))
    }

    /// Entry, list, and list-item counts. Expired entries still on disk are
    /// excluded from `num_entries`.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let num_entries: usize = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE expires_at IS NULL OR expires_at > ?1",
            params![now_epoch()],
            |row| row.get(0),
        )?;
        let num_lists: usize = conn.query_row(
            "SELECT COUNT(DISTINCT key) FROM list_items",
            [],
            |row| row.get(0),
        )?;
        let num_list_items: usize =
            conn.query_row("SELECT COUNT(*) FROM list_items", [], |row| row.get(0))?;
        Ok(StoreStats {
            num_entries,
            num_lists,
            num_list_items,
        })
    }

    fn write(&self, key: &str, value: &[u8], expires_at: Option<f64>) -> Result<()> {
        let conn = self.lock()?;
        // A set replaces whatever was there, including a list under the same
        // key; both deletions happen under the one lock.
        conn.execute("DELETE FROM list_items WHERE key = ?1", params![key])
            .context("Failed to clear list under key")?;
        conn.execute(
            "INSERT OR REPLACE INTO entries (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, value, expires_at],
        )
        .context("Failed to write entry")?;
        Ok(())
    }

    fn read_live_entry(conn: &Connection, key: &str) -> Result<Option<(Vec<u8>, Option<f64>)>> {
        let row: Option<(Vec<u8>, Option<f64>)> = conn
            .query_row(
                "SELECT value, expires_at FROM entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to query entry")?;
        match row {
            Some((_, Some(at))) if at <= now_epoch() => {
                // Lazy reap: expired reads as absent.
                conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
                Ok(None)
            }
            live => Ok(live),
        }
    }

    fn holds_list(conn: &Connection, key: &str) -> Result<bool> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM list_items WHERE key = ?1 LIMIT 1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    /// An expired scalar counts as absent for type checks too, and is reaped
    /// on the way through.
    fn holds_scalar(conn: &Connection, key: &str) -> Result<bool> {
        Ok(Self::read_live_entry(conn, key)?.is_some())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        if Self::holds_list(&conn, key)? {
            return Err(StoreError::WrongType {
                key: key.to_string(),
                op: "get",
                found: "list",
            }
            .into());
        }
        Ok(Self::read_live_entry(&conn, key)?.map(|(value, _)| value))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.write(key, value, None)
    }

    fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()> {
        self.write(key, value, Some(now_epoch() + ttl.as_secs_f64()))
    }

    fn incr(&self, key: &str) -> Result<i64> {
        let conn = self.lock()?;
        if Self::holds_list(&conn, key)? {
            return Err(StoreError::WrongType {
                key: key.to_string(),
                op: "incr",
                found: "list",
            }
            .into());
        }
        // A live counter keeps its deadline across the rewrite; expired or
        // absent keys start fresh with none.
        let (current, expires_at) = match Self::read_live_entry(&conn, key)? {
            None => (0, None),
            Some((bytes, expires_at)) => (
                std::str::from_utf8(&bytes)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| StoreError::decode(key, "an integer"))?,
                expires_at,
            ),
        };
        let next = current + 1;
        conn.execute(
            "INSERT OR REPLACE INTO entries (key, value, expires_at) VALUES (?1, ?2, ?3)",
            params![key, next.to_string().as_bytes(), expires_at],
        )
        .context("Failed to write counter")?;
        Ok(next)
    }

    fn rpush(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.lock()?;
        if Self::holds_scalar(&conn, key)? {
            return Err(StoreError::WrongType {
                key: key.to_string(),
                op: "rpush",
                found: "scalar",
            }
            .into());
        }
        conn.execute(
            "INSERT INTO list_items (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .context("Failed to append list item")?;
        Ok(())
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let conn = self.lock()?;
        if Self::holds_scalar(&conn, key)? {
            return Err(StoreError::WrongType {
                key: key.to_string(),
                op: "lrange",
                found: "scalar",
            }
            .into());
        }
        let mut stmt = conn
            .prepare_cached("SELECT value FROM list_items WHERE key = ?1 ORDER BY id")
            .context("Failed to prepare list query")?;
        let items: Vec<Vec<u8>> = stmt
            .query_map(params![key], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()
            .context("Failed to read list items")?;
        Ok(match resolve_range(items.len(), start, stop) {
            Some((lo, hi)) => items[lo..=hi].to_vec(),
            None => Vec::new(),
        })
    }

    fn flush(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM entries", [])?;
        conn.execute("DELETE FROM list_items", [])?;
        Ok(())
    }
}
