//! Error types for regcorr-state

use thiserror::Error;

/// Errors raised by checkpoint stores.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No checkpoint is stored under the key
    #[error("Checkpoint not found: {key}")]
    NotFound { key: String },

    /// Key contains characters that cannot name a checkpoint
    #[error("Invalid checkpoint key: {key:?}")]
    InvalidKey { key: String },

    /// Digest string is not 64 lowercase hex characters
    #[error("Invalid digest: {digest}")]
    InvalidDigest { digest: String },

    /// Checkpoint payload could not be encoded or decoded
    #[error("Serialization failed for checkpoint {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend task failed to complete
    #[error("Backend error: {0}")]
    Backend(String),
}
