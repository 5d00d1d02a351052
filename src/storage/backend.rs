//! Object store trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

/// Storage error types
#[derive(Debug)]
pub enum StorageError {
    /// Object not found
    NotFound(String),
    /// IO error
    Io(std::io::Error),
    /// Transport or backend failure
    Transport(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::NotFound(key) => write!(f, "object not found: {}", key),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
            StorageError::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed reader returned by `get` for streaming block contents.
pub type BoxReader = Box<dyn tokio::io::AsyncRead + Unpin + Send>;

/// Content-addressed blob store.
///
/// Keys are fixed-length ASCII hex strings (block digests). Writes and
/// deletes are idempotent: re-putting a key with identical content and
/// deleting a missing key both succeed, so callers may race freely.
/// Transport failures are surfaced as-is; no in-adapter retries.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `key`.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Open a streaming reader for the object at `key`.
    async fn get(&self, key: &str) -> StorageResult<BoxReader>;

    /// Cheap existence check.
    async fn head(&self, key: &str) -> StorageResult<bool>;

    /// Remove the object at `key`. Deleting a non-existent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}
