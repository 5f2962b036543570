//! Instrumented key-value caching: call counting, history replay, and TTL
//! memoization over pluggable stores.
//!
//! Three layers compose around a [`store::KeyValueStore`]:
//! - [`instrument::Instrumentor`] counts invocations and records ordered
//!   input/output history for replay;
//! - [`expire::ExpiringCache`] memoizes a single-argument function with a
//!   fixed time-to-live and per-argument access counters;
//! - [`cache::Cache`] is the context object exposing the instrumented write
//!   path and typed reads.
//!
//! Two backings ship in-tree: [`store::MemoryStore`] and
//! [`db::SqliteStore`].

pub mod cache;
pub mod cli;
pub mod commands;
pub mod db;
pub mod errors;
pub mod expire;
pub mod instrument;
pub mod store;
pub mod types;

pub use cache::Cache;
pub use db::SqliteStore;
pub use errors::StoreError;
pub use expire::ExpiringCache;
pub use instrument::Instrumentor;
pub use store::{KeyValueStore, MemoryStore};
pub use types::{CallRecord, Transcript, Value};
