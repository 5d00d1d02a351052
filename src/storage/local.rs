//! Local filesystem object store.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::backend::{BoxReader, ObjectStore, StorageError, StorageResult};

/// Local filesystem object store.
///
/// Objects live in a sharded directory structure:
/// ```text
/// {base_path}/
///   {key[0..2]}/     # First 2 chars of the digest for sharding
///     {key[2..]}     # Rest of the digest as filename
/// ```
pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        if key.len() >= 2 {
            self.base_path.join(&key[..2]).join(&key[2..])
        } else {
            self.base_path.join(key)
        }
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key);
        self.ensure_parent(&path).await?;
        fs::write(&path, &data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<BoxReader> {
        let path = self.key_path(key);
        let file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Box::new(file))
    }

    async fn head(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key);
        Ok(path.exists())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()), // Already deleted
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path().to_path_buf());

        let data = Bytes::from("hello world");
        store.put("abc123def456", data.clone()).await.unwrap();

        let mut reader = store.get("abc123def456").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, data);

        assert!(store.head("abc123def456").await.unwrap());
        assert!(!store.head("nonexistent").await.unwrap());

        store.delete("abc123def456").await.unwrap();
        assert!(!store.head("abc123def456").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path().to_path_buf());

        store.delete("never-existed").await.unwrap();
        store.put("aabbcc", Bytes::from("x")).await.unwrap();
        store.delete("aabbcc").await.unwrap();
        store.delete("aabbcc").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path().to_path_buf());

        let data = Bytes::from("same content");
        store.put("ddeeff", data.clone()).await.unwrap();
        store.put("ddeeff", data.clone()).await.unwrap();

        let mut reader = store.get("ddeeff").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, data);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp_dir.path().to_path_buf());

        match store.get("deadbeef").await {
            Err(StorageError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|_| ())),
        }
    }
}
