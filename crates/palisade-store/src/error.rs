//! Error types for the store layer.

/// Errors from the player store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored value did not parse back (key named for diagnostics).
    #[error("corrupt value at {0}")]
    Corrupt(String),

    /// A caller tried to persist under a sentinel or empty key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Profile serialization failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),
}
