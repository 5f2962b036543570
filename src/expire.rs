use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::debug;

use crate::errors::StoreError;
use crate::store::KeyValueStore;

/// Memoizes a single-argument operation in the store with a fixed TTL.
///
/// Expiry is lazy: the store evaluates the stored deadline at read time, so a
/// stale entry reads as absent and is overwritten by the next fetch. Every
/// fetch, hit or miss, bumps a per-argument access counter.
///
/// The wrapped function is assumed idempotent; nothing here revalidates a
/// live entry against the source of truth.
pub struct ExpiringCache<'a, S, F>
where
    S: KeyValueStore + ?Sized,
    F: Fn(&str) -> Result<String>,
{
    store: &'a S,
    ttl: Duration,
    fetch_fn: F,
    // Serializes the read-check-write so two concurrent misses for the same
    // argument cannot both invoke the wrapped function.
    miss_lock: Mutex<()>,
}

impl<'a, S, F> ExpiringCache<'a, S, F>
where
    S: KeyValueStore + ?Sized,
    F: Fn(&str) -> Result<String>,
{
    pub fn new(store: &'a S, ttl: Duration, fetch_fn: F) -> Self {
        Self {
            store,
            ttl,
            fetch_fn,
            miss_lock: Mutex::new(()),
        }
    }

    fn cache_key(arg: &str) -> String {
        format!("cache:{arg}")
    }

    fn count_key(arg: &str) -> String {
        format!("count:{arg}")
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.miss_lock
            .lock()
            .map_err(|_| anyhow!("cache mutex poisoned"))
    }

    /// Cached result for `arg`, recomputing through the wrapped function once
    /// the TTL has elapsed.
    pub fn fetch(&self, arg: &str) -> Result<String> {
        let _guard = self.guard()?;
        self.store.incr(&Self::count_key(arg))?;
        let key = Self::cache_key(arg);
        if let Some(bytes) = self.store.get(&key)? {
            debug!(arg, "cache hit");
            return String::from_utf8(bytes)
                .map_err(|_| StoreError::decode(&key, "valid utf-8").into());
        }
        debug!(arg, ttl_secs = self.ttl.as_secs_f64(), "cache miss");
        let result = (self.fetch_fn)(arg)?;
        self.store.setex(&key, self.ttl, result.as_bytes())?;
        Ok(result)
    }

    /// Times `arg` has been fetched, hits and misses both counted.
    pub fn accesses(&self, arg: &str) -> Result<u64> {
        let key = Self::count_key(arg);
        match self.store.get(&key)? {
            None => Ok(0),
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| StoreError::decode(&key, "an integer").into()),
        }
    }
}
