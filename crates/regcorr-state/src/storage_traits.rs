//! Storage trait definitions for regcorr
//!
//! - `CheckpointStore`: named, overwritable checkpoint blobs (one per pipeline stage)
//! - `ContentDigest`: SHA-256 fingerprint used to tie a checkpoint to its inputs
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided for
//! testing via the `fakes` module; `FsCheckpointStore` persists to disk.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the string is always valid lowercase hex
/// produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Digest of the canonical JSON encoding of `value`.
    pub fn of_json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::from_bytes(&serde_json::to_vec(value)?))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// CheckpointStore
// ---------------------------------------------------------------------------

/// Validate a checkpoint key.
///
/// Keys name files in the filesystem backend, so they are restricted to
/// ASCII alphanumerics plus `_`, `-` and `.`, and may not start with `.`.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// Named checkpoint store.
///
/// Guarantees:
/// - `put(key, bytes)` replaces any previous value under `key`.
/// - `get(key)` returns the exact bytes last stored, or `NotFound`.
/// - A reader never observes a partially written value.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Store bytes under `key`, overwriting any previous value.
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Retrieve bytes by key. Returns `StorageError::NotFound` if absent.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Check whether a key exists in the store.
    async fn contains(&self, key: &str) -> StorageResult<bool>;

    /// Delete the value under `key`. No-op if absent.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Serialize `value` as JSON and store it under `key`.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn CheckpointStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let bytes = serde_json::to_vec(value).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.put(key, &bytes).await
}

/// Load and deserialize the JSON value under `key`, or `None` if absent.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CheckpointStore,
    key: &str,
) -> StorageResult<Option<T>> {
    let bytes = match store.get(key).await {
        Ok(bytes) => bytes,
        Err(StorageError::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })
}
