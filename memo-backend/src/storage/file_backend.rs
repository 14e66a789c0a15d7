//! File-per-key backend.
//!
//! Each key lives in `<data_dir>/<slug>.json`. Writes go to a sibling temp file
//! that is synced and then renamed over the target, so readers never observe a
//! partially written value.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::backend::KeyValueBackend;
use super::error::{StorageError, StorageResult};

/// Backend storing one file per key inside a data directory
pub struct FileBackend {
    data_dir: PathBuf,
}

impl FileBackend {
    /// Create the backend, creating `data_dir` if needed
    pub fn new(data_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    /// Path of the file holding `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", slugify_key(key)))
    }
}

/// Turn an arbitrary key into a safe file stem (e.g. "My Memos" -> "my-memos")
pub fn slugify_key(key: &str) -> String {
    let slug = key
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<&str>>()
        .join("-");

    if slug.is_empty() { "default".to_string() } else { slug }
}

fn io_failure(action: &str, path: &Path, err: io::Error) -> StorageError {
    StorageError::unknown(format!("Failed to {} {}", action, path.display())).with_cause(err)
}

#[async_trait]
impl KeyValueBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_failure("read", &path, e)),
        }
    }

    async fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");

        let result = async {
            fs::create_dir_all(&self.data_dir).await?;
            let mut file = fs::File::create(&tmp_path).await?;
            file.write_all(value).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(e) = result {
            // Leave the previous value in place and clean up the temp file
            let _ = fs::remove_file(&tmp_path).await;
            return Err(io_failure("write", &path, e));
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_failure("delete", &path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_slugify_key() {
        assert_eq!(slugify_key("memos"), "memos");
        assert_eq!(slugify_key("My Memos!"), "my-memos");
        assert_eq!(slugify_key("../../etc/passwd"), "etc-passwd");
        assert_eq!(slugify_key("memo_app_v2"), "memo_app_v2");
        assert_eq!(slugify_key("///"), "default");
    }

    #[tokio::test]
    async fn test_file_backend_roundtrip() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("data")).unwrap();

        assert!(backend.read("memos").await.unwrap().is_none());

        backend.write("memos", b"[\"a\"]").await.unwrap();
        assert_eq!(backend.read("memos").await.unwrap().unwrap(), b"[\"a\"]");
        assert!(backend.path_for("memos").exists());

        backend.write("memos", b"[]").await.unwrap();
        assert_eq!(backend.read("memos").await.unwrap().unwrap(), b"[]");
        // No temp file left behind after a successful replace
        assert!(!backend.path_for("memos").with_extension("json.tmp").exists());

        backend.delete("memos").await.unwrap();
        assert!(backend.read("memos").await.unwrap().is_none());
        backend.delete("memos").await.unwrap();
    }

    #[tokio::test]
    async fn test_file_backend_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let backend = FileBackend::new(dir.path()).unwrap();
            backend.write("memos", b"persisted").await.unwrap();
        }
        let reopened = FileBackend::new(dir.path()).unwrap();
        assert_eq!(reopened.read("memos").await.unwrap().unwrap(), b"persisted");
    }
}
