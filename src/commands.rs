use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cache::Cache;
use crate::cli::ValueKind;
use crate::db::SqliteStore;
use crate::expire::ExpiringCache;
use crate::types::Value;

fn open_cache(db: &str) -> Result<Cache<SqliteStore>> {
    Ok(Cache::new(
        SqliteStore::open(db).context("Failed to open cachet store")?,
    ))
}

/// Print `data` as pretty JSON if `json` is true, otherwise call `human_fmt`.
fn output<T: Serialize>(data: &T, json: bool, human_fmt: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(data)?);
    } else {
        human_fmt(data);
    }
    Ok(())
}

/// Store a value under a fresh random key.
pub fn cmd_store(db: &str, data: &str, kind: ValueKind, json: bool) -> Result<()> {
    let value = match kind {
        ValueKind::Str => Value::from(data),
        ValueKind::Int => Value::Int(
            data.parse()
                .with_context(|| format!("'{data}' is not an integer"))?,
        ),
        ValueKind::Float => Value::Float(
            data.parse()
                .with_context(|| format!("'{data}' is not a number"))?,
        ),
        ValueKind::Bytes => Value::Bytes(data.as_bytes().to_vec()),
    };
    let cache = open_cache(db)?;
    let key = cache.store(&value)?;

    let result = serde_json::json!({ "key": key });
    output(&result, json, |_| println!("{key}"))
}

/// Retrieve a value by key with a typed view.
pub fn cmd_get(db: &str, key: &str, kind: ValueKind, json: bool) -> Result<()> {
    let cache = open_cache(db)?;
    let value = match kind {
        ValueKind::Str => cache.get_str(key)?.map(serde_json::Value::from),
        ValueKind::Int => cache.get_int(key)?.map(serde_json::Value::from),
        ValueKind::Float => cache.get_float(key)?.map(serde_json::Value::from),
        ValueKind::Bytes => cache
            .get(key)?
            .map(|b| serde_json::Value::from(b.escape_ascii().to_string())),
    };

    let result = serde_json::json!({ "key": key, "value": value });
    output(&result, json, |r| match &r["value"] {
        serde_json::Value::Null => println!("No value at '{key}'"),
        other => match other.as_str() {
            Some(s) => println!("{s}"),
            None => println!("{other}"),
        },
    })
}

/// Show the invocation counter of an instrumented method.
pub fn cmd_calls(db: &str, method: &str, json: bool) -> Result<()> {
    let cache = open_cache(db)?;
    let calls = cache.calls(method)?;

    let result = serde_json::json!({ "method": method, "calls": calls });
    output(&result, json, |_| {
        println!(
            "{method} was called {calls} time{}",
            if calls == 1 { "" } else { "s" }
        )
    })
}

/// Replay the ordered call history of an instrumented method.
pub fn cmd_replay(db: &str, method: &str, json: bool) -> Result<()> {
    let cache = open_cache(db)?;
    let transcript = cache.replay(method)?;

    output(&transcript, json, |t| {
        if t.is_empty() {
            println!("No recorded calls for '{method}'");
        } else {
            print!("{t}");
        }
    })
}

/// Read a file through the TTL cache.
pub fn cmd_fetch(db: &str, path: &str, ttl_secs: u64, json: bool) -> Result<()> {
    let cache = open_cache(db)?;
    let pages = ExpiringCache::new(cache.backend(), Duration::from_secs(ttl_secs), |p| {
        std::fs::read_to_string(p).with_context(|| format!("Failed to read {p}"))
    });
    let content = pages.fetch(path)?;
    let accesses = pages.accesses(path)?;

    let result = serde_json::json!({
        "path": path,
        "bytes": content.len(),
        "accesses": accesses,
    });
    output(&result, json, |_| {
        println!("{path}: {} bytes (access #{accesses})", content.len())
    })
}

/// Store statistics summary.
pub fn cmd_stats(db: &str, json: bool) -> Result<()> {
    let cache = open_cache(db)?;
    let stats = cache.backend().stats()?;

    output(&stats, json, |s| {
        println!("Entries:    {}", s.num_entries);
        println!("Lists:      {}", s.num_lists);
        println!("List items: {}", s.num_list_items);
    })
}

/// Remove every entry, counter, and history list.
pub fn cmd_flush(db: &str, json: bool) -> Result<()> {
    let cache = open_cache(db)?;
    cache.flush()?;

    let result = serde_json::json!({ "flushed": true });
    output(&result, json, |_| println!("Store flushed"))
}
