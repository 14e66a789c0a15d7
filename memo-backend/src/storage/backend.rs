//! Host key-value byte store abstraction.
//!
//! The memo store keeps its whole collection under a single key, so a backend
//! only has to offer whole-value reads and atomic whole-value replacement.

use async_trait::async_trait;
use dashmap::DashMap;

use super::error::StorageResult;

/// Key-value byte store provided by the host environment.
///
/// `write` must replace the previous value atomically from any reader's point
/// of view: a concurrent `read` sees either the old bytes or the new bytes.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    /// Read the value stored under `key`, or `None` if it was never written
    async fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replace the value stored under `key`
    async fn write(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// In-process backend. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a raw value, bypassing the store (used to stage corrupted data)
    pub fn insert_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.entries.insert(key.to_string(), value.into());
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_read_write_delete() {
        let backend = MemoryBackend::new();
        assert!(backend.read("memos").await.unwrap().is_none());

        backend.write("memos", b"[]").await.unwrap();
        assert_eq!(backend.read("memos").await.unwrap().unwrap(), b"[]");

        backend.write("memos", b"[1]").await.unwrap();
        assert_eq!(backend.read("memos").await.unwrap().unwrap(), b"[1]");
        assert_eq!(backend.len(), 1);

        backend.delete("memos").await.unwrap();
        backend.delete("memos").await.unwrap();
        assert!(backend.read("memos").await.unwrap().is_none());
        assert!(backend.is_empty());
    }
}
