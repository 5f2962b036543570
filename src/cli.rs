use clap::{Parser, Subcommand, ValueEnum};

use crate::db::DB_FILE;

#[derive(Debug, Parser)]
#[command(name = "cachet")]
#[command(about = "Instrumented key-value caching: counters, history replay, TTL memoization.")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the store database
    #[arg(long, global = true, default_value = DB_FILE)]
    pub db: String,
}

/// Scalar type used when writing or reading a value.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ValueKind {
    Str,
    Int,
    Float,
    Bytes,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a value under a fresh random key and print the key
    Store {
        /// Value to store
        data: String,

        /// How to interpret the value
        #[arg(long, value_enum, default_value = "str")]
        kind: ValueKind,
    },

    /// Retrieve a value by key
    Get {
        /// Key to look up
        key: String,

        /// Typed view to decode the value as
        #[arg(long, value_enum, default_value = "str")]
        kind: ValueKind,
    },

    /// Show how many times an instrumented method was called
    Calls {
        /// Method identity (e.g. "store")
        method: String,
    },

    /// Replay the ordered call history of an instrumented method
    Replay {
        /// Method identity (e.g. "store")
        method: String,
    },

    /// Read a file through the TTL cache and report hit/miss state
    Fetch {
        /// File path to read
        path: String,

        /// Seconds before the cached content goes stale
        #[arg(long, default_value = "10")]
        ttl_secs: u64,
    },

    /// Store statistics summary
    Stats,

    /// Remove every entry, counter, and history list
    Flush,
}
