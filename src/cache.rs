use anyhow::Result;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::instrument::Instrumentor;
use crate::store::KeyValueStore;
use crate::types::{Transcript, Value};

/// Call identity of the instrumented write path: all [`Cache`] instances over
/// the same store share one counter and one history under this name.
pub const STORE_METHOD: &str = "store";

/// Store-backed cache with an instrumented write path and typed reads.
///
/// Constructed once and passed by reference; the store it owns defines its
/// lifecycle. Reset is explicit via [`Cache::flush`], never implicit.
pub struct Cache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> Cache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The backing store, for layering other wrappers over the same keys.
    pub fn backend(&self) -> &S {
        &self.store
    }

    /// Store `data` under a fresh random key and return the key. Counted and
    /// recorded in history under the `"store"` identity.
    pub fn store(&self, data: &Value) -> Result<String> {
        Instrumentor::new(&self.store, STORE_METHOD).call(&[data.clone()], || {
            let key = Uuid::new_v4().to_string();
            self.store.set(&key, &data.to_bytes())?;
            Ok(key)
        })
    }

    /// Raw bytes at `key`; `None` when absent or expired.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store.get(key)
    }

    /// Read `key` and convert through `f`. Absence short-circuits to `None`
    /// without invoking the converter.
    pub fn get_with<T>(
        &self,
        key: &str,
        f: impl FnOnce(Vec<u8>) -> Result<T>,
    ) -> Result<Option<T>> {
        match self.store.get(key)? {
            None => Ok(None),
            Some(bytes) => f(bytes).map(Some),
        }
    }

    /// UTF-8 view of the value at `key`. Invalid bytes are a decode error,
    /// never lossily coerced.
    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        self.get_with(key, |bytes| {
            String::from_utf8(bytes).map_err(|_| StoreError::decode(key, "valid utf-8").into())
        })
    }

    /// Integer view of the value at `key`.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        self.get_with(key, |bytes| {
            std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| StoreError::decode(key, "an integer").into())
        })
    }

    /// Float view of the value at `key`.
    pub fn get_float(&self, key: &str) -> Result<Option<f64>> {
        self.get_with(key, |bytes| {
            std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| StoreError::decode(key, "a number").into())
        })
    }

    /// Times `method` has been called. 0 when never instrumented.
    pub fn calls(&self, method: &str) -> Result<u64> {
        Instrumentor::new(&self.store, method).calls()
    }

    /// Ordered transcript of `method`'s recorded history.
    pub fn replay(&self, method: &str) -> Result<Transcript> {
        Instrumentor::new(&self.store, method).replay()
    }

    /// Drop every entry, counter, and history list.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }
}
