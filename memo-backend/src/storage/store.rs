//! MemoStore — validated CRUD over a host key-value backend
//!
//! The whole collection lives under one key and every mutation rewrites it in
//! full. The replace is the transaction boundary: readers see either the old
//! collection or the new one. Writes larger than the configured quota are
//! rejected before anything reaches the backend.

use chrono::Utc;
use memo_types::{Memo, MemoId, MemoPatch};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::backend::KeyValueBackend;
use super::codec;
use super::error::{StorageError, StorageResult};
use crate::config::StoreConfig;

/// Outcome of merging an exported collection into the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Durable memo collection
pub struct MemoStore {
    backend: Arc<dyn KeyValueBackend>,
    config: StoreConfig,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl MemoStore {
    pub fn new(backend: Arc<dyn KeyValueBackend>, config: StoreConfig) -> Self {
        Self {
            backend,
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Configured maximum serialized size in bytes
    pub fn quota_bytes(&self) -> usize {
        self.config.quota_bytes
    }

    /// Read every memo, newest `updated_at` first.
    ///
    /// A missing value is an empty collection. A value that is not a sequence,
    /// or that holds any invalid record, fails the whole read with `ParseError`.
    pub async fn list_all(&self) -> StorageResult<Vec<Memo>> {
        let mut memos = self.load_stored().await?;
        codec::sort_newest_first(&mut memos);
        Ok(memos)
    }

    /// Look up a memo. Unknown ids and ids that are not UUID-shaped yield `None`.
    pub async fn get_by_id(&self, id: &str) -> StorageResult<Option<Memo>> {
        let Some(id) = MemoId::parse(id) else {
            return Ok(None);
        };
        let memos = self.load_stored().await?;
        Ok(memos.into_iter().find(|m| m.id == id))
    }

    /// Create and persist a new memo with a fresh id
    pub async fn create(&self, content: &str) -> StorageResult<Memo> {
        let _guard = self.write_lock.lock().await;

        let mut memos = self.load_stored().await?;
        let now = Utc::now();
        let memo = Memo {
            id: MemoId::new(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };

        // Head of the stored sequence so equal timestamps still read newest-first
        memos.insert(0, memo.clone());
        self.write_collection(&memos).await?;

        log::info!("[MEMO_STORE] Created memo {}", memo.id);
        Ok(memo)
    }

    /// Merge `patch` into an existing memo and bump its `updated_at`
    pub async fn update(&self, id: &str, patch: MemoPatch) -> StorageResult<Memo> {
        let _guard = self.write_lock.lock().await;

        let mut memos = self.load_stored().await?;
        let index = find_index(&memos, id)?;

        let memo = &mut memos[index];
        patch.apply(memo);
        // Never move backwards, even if the wall clock does
        memo.updated_at = Utc::now().max(memo.updated_at).max(memo.created_at);
        let updated = memo.clone();

        self.write_collection(&memos).await?;

        log::debug!("[MEMO_STORE] Updated memo {}", updated.id);
        Ok(updated)
    }

    /// Delete a memo
    pub async fn remove(&self, id: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;

        let mut memos = self.load_stored().await?;
        let index = find_index(&memos, id)?;
        let removed = memos.remove(index);

        self.write_collection(&memos).await?;

        log::info!("[MEMO_STORE] Removed memo {}", removed.id);
        Ok(())
    }

    /// Replace the stored collection with `memos`, subject to the quota
    pub async fn persist(&self, memos: &[Memo]) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        self.write_collection(memos).await
    }

    /// Byte size of the currently stored value (0 when nothing is stored)
    pub async fn size_estimate(&self) -> StorageResult<usize> {
        Ok(self
            .backend
            .read(&self.config.storage_key)
            .await?
            .map(|bytes| bytes.len())
            .unwrap_or(0))
    }

    /// Drop the stored collection entirely. Used to recover from corruption.
    pub async fn clear(&self) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        self.backend.delete(&self.config.storage_key).await?;
        log::warn!(
            "[MEMO_STORE] Cleared stored memos under key '{}'",
            self.config.storage_key
        );
        Ok(())
    }

    /// Merge an exported JSON collection into the store.
    ///
    /// The import is validated with the same fail-fast rules as a read. For ids
    /// present on both sides the copy with the newer `updated_at` wins.
    pub async fn import_json(&self, bytes: &[u8]) -> StorageResult<ImportSummary> {
        let incoming = codec::decode(bytes)?;

        let _guard = self.write_lock.lock().await;
        let mut memos = self.load_stored().await?;
        let mut summary = ImportSummary::default();

        for memo in incoming {
            match memos.iter_mut().find(|m| m.id == memo.id) {
                Some(existing) if memo.updated_at > existing.updated_at => {
                    *existing = memo;
                    summary.updated += 1;
                }
                Some(_) => summary.unchanged += 1,
                None => {
                    memos.push(memo);
                    summary.added += 1;
                }
            }
        }

        if summary.added + summary.updated > 0 {
            self.write_collection(&memos).await?;
        }

        log::info!(
            "[MEMO_STORE] Imported memos: {} added, {} updated, {} unchanged",
            summary.added,
            summary.updated,
            summary.unchanged
        );
        Ok(summary)
    }

    /// Stored collection in stored order
    async fn load_stored(&self) -> StorageResult<Vec<Memo>> {
        match self.backend.read(&self.config.storage_key).await? {
            None => Ok(Vec::new()),
            Some(bytes) => codec::decode(&bytes).inspect_err(|e| {
                log::error!("[MEMO_STORE] Stored collection rejected: {}", e);
            }),
        }
    }

    /// Quota-checked full replace. Callers hold `write_lock`.
    async fn write_collection(&self, memos: &[Memo]) -> StorageResult<()> {
        let bytes = codec::encode(memos)?;

        if bytes.len() > self.config.quota_bytes {
            log::warn!(
                "[MEMO_STORE] Rejected write of {} bytes (quota {} bytes)",
                bytes.len(),
                self.config.quota_bytes
            );
            return Err(StorageError::quota_exceeded(format!(
                "serialized collection is {} bytes, quota is {} bytes",
                bytes.len(),
                self.config.quota_bytes
            )));
        }

        self.backend.write(&self.config.storage_key, &bytes).await?;

        log::debug!(
            "[MEMO_STORE] Persisted {} memos ({} bytes) via {} backend",
            memos.len(),
            bytes.len(),
            self.backend.name()
        );
        Ok(())
    }
}

fn find_index(memos: &[Memo], id: &str) -> StorageResult<usize> {
    MemoId::parse(id)
        .and_then(|id| memos.iter().position(|m| m.id == id))
        .ok_or_else(|| StorageError::not_found(format!("no memo with id '{}'", id)))
}
