//! MemoService — the single entry point for the presentation layer
//!
//! Holds the in-memory cache, the current selection and the search state.
//! Edits are applied to the cache immediately and handed to a per-memo
//! `SaveScheduler`; creates, explicit updates and deletes go straight to the
//! store and propagate their errors. The cache is authoritative for display,
//! the store for durability; a successful commit reconciles the two.

pub mod export;
pub mod search_debounce;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use memo_types::{ExportFormat, Memo, MemoDraft, MemoId, MemoPatch, SaveStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{AsRefStr, Display};
use tokio::sync::watch;

use crate::autosave::{Committer, SaveScheduler, SaveSnapshot};
use crate::config::ServiceConfig;
use crate::search;
use crate::storage::{codec, ImportSummary, MemoStore, StorageError, StorageErrorKind, StorageResult};
use search_debounce::SearchDebouncer;

/// Lifecycle notifications from the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum HostSignal {
    /// The session is no longer visible
    Hidden,
    /// The session is about to end
    Ending,
}

/// Cloneable copy of a storage failure kept as the global error state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: StorageErrorKind,
    pub message: String,
}

impl From<&StorageError> for ServiceError {
    fn from(err: &StorageError) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}

/// Stored size relative to the configured quota
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub used_bytes: usize,
    pub quota_bytes: usize,
}

impl QuotaUsage {
    /// Used share of the quota in percent
    pub fn percent(&self) -> f64 {
        if self.quota_bytes == 0 {
            return 100.0;
        }
        self.used_bytes as f64 * 100.0 / self.quota_bytes as f64
    }
}

#[derive(Default)]
struct ServiceState {
    /// Newest `updated_at` first
    memos: Vec<Memo>,
    current: Option<MemoId>,
    /// Edited content not yet confirmed by a successful commit
    drafts: HashMap<MemoId, String>,
    is_loading: bool,
    error: Option<ServiceError>,
    /// Raw search input, applied after the search debounce
    search_input: String,
    applied_query: String,
}

impl ServiceState {
    fn position(&self, id: &MemoId) -> Option<usize> {
        self.memos.iter().position(|m| &m.id == id)
    }

    /// Replace or insert `memo` and restore newest-first order
    fn upsert(&mut self, memo: Memo) {
        match self.position(&memo.id) {
            Some(index) => self.memos[index] = memo,
            None => self.memos.insert(0, memo),
        }
        codec::sort_newest_first(&mut self.memos);
    }
}

/// Commits drafts through the store and reconciles the cache on success
struct StoreCommitter {
    store: Arc<MemoStore>,
    state: Arc<RwLock<ServiceState>>,
}

#[async_trait]
impl Committer<MemoDraft> for StoreCommitter {
    async fn commit(&self, draft: MemoDraft) -> Result<(), String> {
        let stored = self
            .store
            .update(draft.id.as_str(), MemoPatch::content(draft.content))
            .await
            .map_err(|e| e.to_string())?;

        let mut state = self.state.write();
        if state.drafts.get(&stored.id) == Some(&stored.content) {
            state.drafts.remove(&stored.id);
        }
        if let Some(index) = state.position(&stored.id) {
            if state.memos[index].content == stored.content {
                state.memos[index].updated_at = stored.updated_at;
                codec::sort_newest_first(&mut state.memos);
            }
        }
        Ok(())
    }
}

pub struct MemoService {
    store: Arc<MemoStore>,
    config: ServiceConfig,
    state: Arc<RwLock<ServiceState>>,
    committer: Arc<StoreCommitter>,
    /// One autosave scheduler per memo with edits in play
    schedulers: DashMap<MemoId, SaveScheduler<MemoDraft>>,
    search: SearchDebouncer,
}

impl MemoService {
    /// Build the service around an explicitly constructed store.
    /// Must be called inside a tokio runtime.
    pub fn new(store: Arc<MemoStore>, config: ServiceConfig) -> Self {
        let state = Arc::new(RwLock::new(ServiceState::default()));
        let committer = Arc::new(StoreCommitter {
            store: Arc::clone(&store),
            state: Arc::clone(&state),
        });
        let search = SearchDebouncer::new(config.search_debounce);

        Self {
            store,
            config,
            state,
            committer,
            schedulers: DashMap::new(),
            search,
        }
    }

    pub fn store(&self) -> &Arc<MemoStore> {
        &self.store
    }

    // =====================================================
    // Loading
    // =====================================================

    /// Startup load. A failure leaves the cache empty and sets the error state.
    pub async fn start(&self) {
        self.load_cache().await;
    }

    /// Re-run the startup load, clearing the previous error first
    pub async fn reload(&self) {
        self.state.write().error = None;
        self.load_cache().await;
    }

    async fn load_cache(&self) {
        self.state.write().is_loading = true;

        let result = self.store.list_all().await;

        let mut state = self.state.write();
        state.is_loading = false;
        match result {
            Ok(mut memos) => {
                log::info!("[MEMO_SERVICE] Loaded {} memos", memos.len());
                if let Some(current) = state.current.clone() {
                    if !memos.iter().any(|m| m.id == current) {
                        state.current = None;
                    }
                }

                // Unconfirmed edits stay on display until their commit lands
                state.drafts.retain(|id, _| memos.iter().any(|m| &m.id == id));
                for memo in memos.iter_mut() {
                    let Some(draft) = state.drafts.get(&memo.id) else {
                        continue;
                    };
                    memo.content = draft.clone();
                    if let Some(cached) = state.memos.iter().find(|m| m.id == memo.id) {
                        memo.updated_at = memo.updated_at.max(cached.updated_at);
                    }
                }
                codec::sort_newest_first(&mut memos);
                state.memos = memos;
            }
            Err(e) => {
                log::error!("[MEMO_SERVICE] Failed to load memos: {}", e);
                state.memos.clear();
                state.current = None;
                state.error = Some(ServiceError::from(&e));
            }
        }
    }

    /// Wipe a corrupted collection and start over empty
    pub async fn reset_corrupted(&self) -> StorageResult<()> {
        self.store.clear().await?;

        for entry in self.schedulers.iter() {
            entry.value().reset();
        }
        self.schedulers.clear();

        let mut state = self.state.write();
        state.memos.clear();
        state.drafts.clear();
        state.current = None;
        state.error = None;
        log::warn!("[MEMO_SERVICE] Reset corrupted memo collection");
        Ok(())
    }

    /// Merge an exported JSON collection into the store and refresh the cache
    pub async fn import_json(&self, bytes: &[u8]) -> StorageResult<ImportSummary> {
        let summary = self.store.import_json(bytes).await?;
        self.load_cache().await;
        Ok(summary)
    }

    // =====================================================
    // Views
    // =====================================================

    /// Cached memos whose content matches `query`, in cache order
    pub fn filtered_view(&self, query: &str) -> Vec<Memo> {
        let state = self.state.read();
        if query.trim().is_empty() {
            return state.memos.clone();
        }
        state
            .memos
            .iter()
            .filter(|m| search::matches(&m.content, query))
            .cloned()
            .collect()
    }

    /// Filtered view for the currently applied search query
    pub fn visible(&self) -> Vec<Memo> {
        let query = self.state.read().applied_query.clone();
        self.filtered_view(&query)
    }

    pub fn memos(&self) -> Vec<Memo> {
        self.state.read().memos.clone()
    }

    pub fn current(&self) -> Option<Memo> {
        let state = self.state.read();
        let id = state.current.as_ref()?;
        state.memos.iter().find(|m| &m.id == id).cloned()
    }

    pub fn current_id(&self) -> Option<MemoId> {
        self.state.read().current.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().is_loading
    }

    pub fn error(&self) -> Option<ServiceError> {
        self.state.read().error.clone()
    }

    // =====================================================
    // Search
    // =====================================================

    /// Record the raw search input; it filters `visible()` once typing pauses
    pub fn set_search(&self, query: &str) {
        self.state.write().search_input = query.to_string();

        let state = Arc::clone(&self.state);
        let query = query.to_string();
        self.search.schedule(move || {
            state.write().applied_query = query;
        });
    }

    /// Clear the search immediately
    pub fn clear_search(&self) {
        self.search.cancel();
        let mut state = self.state.write();
        state.search_input.clear();
        state.applied_query.clear();
    }

    pub fn search_input(&self) -> String {
        self.state.read().search_input.clone()
    }

    pub fn applied_query(&self) -> String {
        self.state.read().applied_query.clone()
    }

    // =====================================================
    // Mutations
    // =====================================================

    /// Persist a new memo, put it at the head of the cache and select it
    pub async fn create_and_select(&self, content: &str) -> StorageResult<Memo> {
        let memo = self.store.create(content).await?;

        let previous = {
            let mut state = self.state.write();
            state.memos.insert(0, memo.clone());
            state.current.replace(memo.id.clone())
        };
        self.after_selection_change(previous);

        Ok(memo)
    }

    /// Change the current selection. Returns false if `id` is not cached.
    pub fn select(&self, id: &str) -> bool {
        let Some(id) = MemoId::parse(id) else {
            return false;
        };

        let previous = {
            let mut state = self.state.write();
            if state.position(&id).is_none() {
                return false;
            }
            if state.current.as_ref() == Some(&id) {
                return true;
            }
            state.current.replace(id)
        };
        self.after_selection_change(previous);
        true
    }

    /// Clear the current selection
    pub fn deselect(&self) {
        let previous = self.state.write().current.take();
        self.after_selection_change(previous);
    }

    /// Apply `content` to the current memo now and schedule its durable commit
    pub fn edit_current(&self, content: &str) {
        let (baseline, draft) = {
            let mut state = self.state.write();
            let Some(id) = state.current.clone() else {
                log::warn!("[MEMO_SERVICE] Edit ignored: no memo selected");
                return;
            };
            let Some(index) = state.position(&id) else {
                log::warn!("[MEMO_SERVICE] Edit ignored: selected memo {} is not cached", id);
                return;
            };

            let mut memo = state.memos.remove(index);
            if memo.content == content {
                state.memos.insert(index, memo);
                return;
            }
            let baseline = MemoDraft::new(memo.id.clone(), memo.content.clone());
            memo.content = content.to_string();
            memo.updated_at = Utc::now().max(memo.updated_at);
            state.memos.insert(0, memo);
            state.drafts.insert(id.clone(), content.to_string());

            (baseline, MemoDraft::new(id, content))
        };

        let scheduler = self
            .schedulers
            .entry(draft.id.clone())
            .or_insert_with(|| {
                let scheduler = SaveScheduler::spawn(
                    self.config.scheduler.clone(),
                    self.committer.clone() as Arc<dyn Committer<MemoDraft>>,
                );
                scheduler.seed(baseline);
                scheduler
            });
        scheduler.observe(draft);
    }

    /// Synchronously update any memo through the store
    pub async fn update(&self, id: &str, content: &str) -> StorageResult<Memo> {
        let memo = self.store.update(id, MemoPatch::content(content)).await?;

        if let Some(scheduler) = self.schedulers.get(&memo.id) {
            scheduler.seed(MemoDraft::new(memo.id.clone(), memo.content.clone()));
        }
        let mut state = self.state.write();
        state.drafts.remove(&memo.id);
        state.upsert(memo.clone());
        Ok(memo)
    }

    /// Remove a memo from the store and the cache
    pub async fn delete(&self, id: &str) -> StorageResult<()> {
        self.store.remove(id).await?;

        let Some(id) = MemoId::parse(id) else {
            return Ok(());
        };
        if let Some((_, scheduler)) = self.schedulers.remove(&id) {
            scheduler.reset();
        }

        let mut state = self.state.write();
        state.drafts.remove(&id);
        state.memos.retain(|m| m.id != id);
        if state.current.as_ref() == Some(&id) {
            state.current = None;
        }
        Ok(())
    }

    /// Render the cached collection
    pub fn export(&self, format: ExportFormat) -> StorageResult<String> {
        let memos = self.memos();
        export::render(&memos, format)
    }

    // =====================================================
    // Autosave
    // =====================================================

    /// Best-effort flush of pending edits when the host hides or ends the session.
    /// Does not wait for the commits to finish.
    pub fn handle_host_signal(&self, signal: HostSignal) {
        log::info!(
            "[MEMO_SERVICE] Host signal '{}': flushing {} autosave scheduler(s)",
            signal,
            self.schedulers.len()
        );
        // Schedulers with nothing unsaved ignore the flush
        for entry in self.schedulers.iter() {
            entry.value().flush();
        }
    }

    /// Autosave status of the current selection
    pub fn status(&self) -> SaveStatus {
        self.current_snapshot().status
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.current_snapshot().last_saved_at
    }

    /// Status updates for the memo selected at the time of the call
    pub fn subscribe_status(&self) -> watch::Receiver<SaveSnapshot> {
        match self.current_id().and_then(|id| self.schedulers.get(&id).map(|s| s.subscribe())) {
            Some(rx) => rx,
            None => watch::channel(SaveSnapshot::default()).1,
        }
    }

    fn current_snapshot(&self) -> SaveSnapshot {
        self.current_id()
            .and_then(|id| self.schedulers.get(&id).map(|s| s.snapshot()))
            .unwrap_or_default()
    }

    /// Commit any pending edit of the memo that just lost the selection
    fn after_selection_change(&self, previous: Option<MemoId>) {
        let Some(previous) = previous else {
            return;
        };
        if let Some(scheduler) = self.schedulers.get(&previous) {
            log::debug!("[MEMO_SERVICE] Flushing {} on selection change", previous);
            scheduler.flush();
        }
    }

    // =====================================================
    // Storage usage
    // =====================================================

    pub async fn size_estimate(&self) -> StorageResult<usize> {
        self.store.size_estimate().await
    }

    pub async fn quota_usage(&self) -> StorageResult<QuotaUsage> {
        Ok(QuotaUsage {
            used_bytes: self.store.size_estimate().await?,
            quota_bytes: self.store.quota_bytes(),
        })
    }
}
