use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};

use crate::errors::StoreError;

/// Minimal key-value contract consumed by the instrumentation and caching
/// layers. Implementations must make `incr` and `rpush` atomic per key; the
/// layers above never rely on multi-key transactions.
///
/// Absent keys read as `Ok(None)` / empty, never as errors. An entry whose
/// TTL has elapsed reads as absent; expiry is checked lazily at read time,
/// there is no background eviction.
pub trait KeyValueStore: Send + Sync {
    /// Raw bytes stored at `key`, or `None` when absent or expired.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` at `key` with no expiry, replacing whatever was there.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Store `value` at `key`; the entry reads as absent once `ttl` elapses.
    fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()>;

    /// Atomically increment the integer at `key` and return the new value.
    /// Absent keys initialize to 0 first. Non-numeric bytes are a
    /// [`StoreError::Decode`].
    fn incr(&self, key: &str) -> Result<i64>;

    /// Append `value` to the list at `key`, creating the list if needed.
    fn rpush(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Inclusive slice of the list at `key`. Negative indices count from the
    /// end (-1 is the last element); out-of-range bounds clamp; an inverted
    /// range or absent key yields an empty vec.
    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>>;

    /// Remove every entry, counter, and list.
    fn flush(&self) -> Result<()>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()> {
        (**self).setex(key, ttl, value)
    }

    fn incr(&self, key: &str) -> Result<i64> {
        (**self).incr(key)
    }

    fn rpush(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).rpush(key, value)
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        (**self).lrange(key, start, stop)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }
}

/// Seconds since the unix epoch, the timestamp format used for expiry.
pub(crate) fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Resolve a Redis-style inclusive range against a list of `len` elements.
/// Returns `None` when the resolved range selects nothing.
pub(crate) fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

enum Slot {
    Scalar {
        data: Vec<u8>,
        expires_at: Option<f64>,
    },
    List(Vec<Vec<u8>>),
}

impl Slot {
    fn kind(&self) -> &'static str {
        match self {
            Slot::Scalar { .. } => "scalar",
            Slot::List(_) => "list",
        }
    }
}

/// In-memory backing, primarily for tests and embedding. One mutex guards
/// the whole map, which makes `incr` and `rpush` atomic per key.
#[derive(Default)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Slot>>> {
        self.slots.lock().map_err(|_| anyhow!("store mutex poisoned"))
    }

    /// Number of live slots, counting expired scalars that have not been
    /// reaped yet.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut slots = self.lock()?;
        let expired = match slots.get(key) {
            Some(Slot::Scalar {
                expires_at: Some(at),
                ..
            }) => *at <= now_epoch(),
            _ => false,
        };
        if expired {
            // Lazy reap: expired reads as absent.
            slots.remove(key);
            return Ok(None);
        }
        match slots.get(key) {
            Some(Slot::Scalar { data, .. }) => Ok(Some(data.clone())),
            Some(Slot::List(_)) => Err(StoreError::WrongType {
                key: key.to_string(),
                op: "get",
                found: "list",
            }
            .into()),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.insert(
            key.to_string(),
            Slot::Scalar {
                data: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    fn setex(&self, key: &str, ttl: Duration, value: &[u8]) -> Result<()> {
        self.lock()?.insert(
            key.to_string(),
            Slot::Scalar {
                data: value.to_vec(),
                expires_at: Some(now_epoch() + ttl.as_secs_f64()),
            },
        );
        Ok(())
    }

    fn incr(&self, key: &str) -> Result<i64> {
        let mut slots = self.lock()?;
        // An expired scalar counts as absent; a live one keeps its deadline
        // across the rewrite.
        let (current, expires_at) = match slots.get(key) {
            None => (0, None),
            Some(Slot::Scalar {
                expires_at: Some(at),
                ..
            }) if *at <= now_epoch() => (0, None),
            Some(Slot::Scalar { data, expires_at }) => (
                std::str::from_utf8(data)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| StoreError::decode(key, "an integer"))?,
                *expires_at,
            ),
            Some(slot @ Slot::List(_)) => {
                return Err(StoreError::WrongType {
                    key: key.to_string(),
                    op: "incr",
                    found: slot.kind(),
                }
                .into())
            }
        };
        let next = current + 1;
        slots.insert(
            key.to_string(),
            Slot::Scalar {
                data: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    fn rpush(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut slots = self.lock()?;
        // Reap an expired scalar first so the write lands on an absent key.
        if matches!(
            slots.get(key),
            Some(Slot::Scalar { expires_at: Some(at), .. }) if *at <= now_epoch()
        ) {
            slots.remove(key);
        }
        match slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::List(Vec::new()))
        {
            Slot::List(items) => {
                items.push(value.to_vec());
                Ok(())
            }
            slot => Err(StoreError::WrongType {
                key: key.to_string(),
                op: "rpush",
                found: slot.kind(),
            }
            .into()),
        }
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<Vec<u8>>> {
        let mut slots = self.lock()?;
        if matches!(
            slots.get(key),
            Some(Slot::Scalar { expires_at: Some(at), .. }) if *at <= now_epoch()
        ) {
            slots.remove(key);
        }
        match slots.get(key) {
            None => Ok(Vec::new()),
            Some(Slot::List(items)) => Ok(match resolve_range(items.len(), start, stop) {
                Some((lo, hi)) => items[lo..=hi].to_vec(),
                None => Vec::new(),
            }),
            Some(slot) => Err(StoreError::WrongType {
                key: key.to_string(),
                op: "lrange",
                found: slot.kind(),
            }
            .into()),
        }
    }

    fn flush(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_absent_is_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_set_then_get_roundtrip() {
        let store = MemoryStore::new();
        store.set("k", b"hello").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn test_set_overwrites() {
        let store = MemoryStore::new();
        store.set("k", b"a").unwrap();
        store.set("k", b"b").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn test_setex_live_then_expired() {
        let store = MemoryStore::new();
        store
            .setex("k", Duration::from_millis(40), b"soon gone")
            .unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"soon gone".to_vec()));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.get("k").unwrap(), None);
        // The expired slot was reaped on read.
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_set_over_list_replaces_it() {
        let store = MemoryStore::new();
        store.rpush("k", b"item").unwrap();
        store.set("k", b"scalar").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"scalar".to_vec()));
    }

    #[test]
    fn test_rpush_after_expired_scalar_creates_list() {
        let store = MemoryStore::new();
        store.setex("k", Duration::from_millis(20), b"old").unwrap();
        std::thread::sleep(Duration::from_millis(40));
        store.rpush("k", b"fresh").unwrap();
        assert_eq!(store.lrange("k", 0, -1).unwrap(), vec![b"fresh".to_vec()]);
    }

    #[test]
    fn test_lrange_after_expired_scalar_is_empty() {
        let store = MemoryStore::new();
        store.setex("k", Duration::from_millis(20), b"old").unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(store.lrange("k", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_incr_preserves_ttl() {
        let store = MemoryStore::new();
        store.setex("n", Duration::from_millis(50), b"1").unwrap();
        assert_eq!(store.incr("n").unwrap(), 2);
        assert_eq!(store.get("n").unwrap(), Some(b"2".to_vec()));
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(store.get("n").unwrap(), None);
    }

    #[test]
    fn test_incr_from_absent() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("n").unwrap(), 1);
        assert_eq!(store.incr("n").unwrap(), 2);
        assert_eq!(store.incr("n").unwrap(), 3);
    }

    #[test]
    fn test_incr_on_stored_number() {
        let store = MemoryStore::new();
        store.set("n", b"41").unwrap();
        assert_eq!(store.incr("n").unwrap(), 42);
    }

    #[test]
    fn test_incr_non_numeric_is_decode_error() {
        let store = MemoryStore::new();
        store.set("n", b"not a number").unwrap();
        let err = store.incr("n").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Decode { .. })
        ));
    }

    #[test]
    fn test_incr_on_list_is_wrong_type() {
        let store = MemoryStore::new();
        store.rpush("l", b"x").unwrap();
        let err = store.incr("l").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::WrongType { .. })
        ));
    }

    #[test]
    fn test_rpush_on_scalar_is_wrong_type() {
        let store = MemoryStore::new();
        store.set("k", b"v").unwrap();
        assert!(store.rpush("k", b"x").is_err());
    }

    #[test]
    fn test_lrange_order_and_negative_indices() {
        let store = MemoryStore::new();
        for item in [b"a".as_slice(), b"b", b"c", b"d"] {
            store.rpush("l", item).unwrap();
        }
        let all = store.lrange("l", 0, -1).unwrap();
        assert_eq!(all, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
        let tail = store.lrange("l", -2, -1).unwrap();
        assert_eq!(tail, vec![b"c".to_vec(), b"d".to_vec()]);
        let empty = store.lrange("l", 3, 1).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_lrange_absent_is_empty() {
        let store = MemoryStore::new();
        assert!(store.lrange("missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_flush_clears_everything() {
        let store = MemoryStore::new();
        store.set("k", b"v").unwrap();
        store.incr("n").unwrap();
        store.rpush("l", b"x").unwrap();
        store.flush().unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.lrange("l", 0, -1).unwrap().is_empty());
        assert_eq!(store.incr("n").unwrap(), 1);
    }

    #[test]
    fn test_resolve_range_clamping() {
        assert_eq!(resolve_range(4, 0, 100), Some((0, 3)));
        assert_eq!(resolve_range(4, -100, -1), Some((0, 3)));
        assert_eq!(resolve_range(4, 2, 1), None);
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(4, 0, -5), None);
    }
}
