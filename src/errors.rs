use thiserror::Error;

/// Typed failures the layers above may want to tell apart.
///
/// Everything else travels as plain `anyhow` context. Absent keys are never
/// errors; reads return `Ok(None)` for them.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Stored bytes could not be decoded as the requested type.
    #[error("value at `{key}` is not {wanted}")]
    Decode { key: String, wanted: &'static str },

    /// Operation applied to a key holding the wrong kind of slot
    /// (e.g. `incr` on a list, `rpush` on a scalar).
    #[error("{op} against `{key}` which holds a {found}")]
    WrongType {
        key: String,
        op: &'static str,
        found: &'static str,
    },
}

impl StoreError {
    pub fn decode(key: &str, wanted: &'static str) -> Self {
        Self::Decode {
            key: key.to_string(),
            wanted,
        }
    }
}
