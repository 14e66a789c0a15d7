//! End-to-end flows through `MemoService` over real backends.
//!
//! Timing-sensitive flows run on the in-process backend with a paused tokio
//! clock. Flows that touch the filesystem run in real time with short
//! debounce windows and wait on the published save status.

use async_trait::async_trait;
use memo_backend::config::{SchedulerConfig, ServiceConfig, StoreConfig};
use memo_backend::service::{HostSignal, MemoService};
use memo_backend::storage::{
    FileBackend, KeyValueBackend, MemoStore, MemoryBackend, SqliteBackend, StorageError,
    StorageErrorKind, StorageResult,
};
use memo_backend::{ExportFormat, MemoPatch, SaveStatus};
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const STORAGE_KEY: &str = "memos";

fn paused_config() -> ServiceConfig {
    ServiceConfig {
        search_debounce: Duration::from_millis(300),
        scheduler: SchedulerConfig {
            debounce: Duration::from_millis(1000),
            max_retries: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_millis(10_000),
        },
    }
}

fn real_time_config() -> ServiceConfig {
    ServiceConfig {
        search_debounce: Duration::from_millis(5),
        scheduler: SchedulerConfig {
            debounce: Duration::from_millis(20),
            max_retries: 1,
            backoff_base: Duration::from_millis(10),
            backoff_cap: Duration::from_millis(10),
        },
    }
}

async fn service_over(backend: Arc<dyn KeyValueBackend>, config: ServiceConfig) -> MemoService {
    let store = Arc::new(MemoStore::new(backend, StoreConfig::default()));
    let service = MemoService::new(store, config);
    service.start().await;
    service
}

async fn advance(millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

async fn wait_for_saved(service: &MemoService) {
    let mut rx = service.subscribe_status();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.status == SaveStatus::Saved),
    )
    .await
    .expect("Timed out waiting for the save to land")
    .expect("Scheduler stopped before saving");
}

/// Memory backend whose writes can be switched to fail
struct FlakyBackend {
    inner: MemoryBackend,
    failing: AtomicBool,
    writes: AtomicUsize,
}

impl FlakyBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(),
            failing: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl KeyValueBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.read(key).await
    }

    async fn write(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::unknown("disk unavailable"));
        }
        self.inner.write(key, value).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }
}

// =========================================================================
// Editing and autosave
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_edit_lands_after_debounce() {
    let service = service_over(Arc::new(MemoryBackend::new()), paused_config()).await;

    let memo = service.create_and_select("").await.expect("create failed");
    assert_eq!(memo.content, "");

    service.edit_current("Hello");
    advance(999).await;
    let stored = service.store().get_by_id(memo.id.as_str()).await.unwrap().unwrap();
    assert_eq!(stored.content, "", "Commit must wait out the debounce window");

    advance(2).await;
    let stored = service.store().get_by_id(memo.id.as_str()).await.unwrap().unwrap();
    assert_eq!(stored.content, "Hello");
    assert_eq!(service.status(), SaveStatus::Saved);
    assert!(stored.updated_at >= stored.created_at);
}

#[tokio::test(start_paused = true)]
async fn test_typing_burst_writes_once() {
    let backend = FlakyBackend::new();
    let service = service_over(backend.clone(), paused_config()).await;
    service.create_and_select("").await.expect("create failed");
    let writes_after_create = backend.writes.load(Ordering::SeqCst);

    let mut text = String::new();
    for c in "hello world".chars() {
        text.push(c);
        service.edit_current(&text);
        advance(100).await;
    }
    advance(1000).await;

    assert_eq!(backend.writes.load(Ordering::SeqCst), writes_after_create + 1);
    assert_eq!(service.current().unwrap().content, "hello world");
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_surface_error_then_recover() {
    let backend = FlakyBackend::new();
    let service = service_over(backend.clone(), paused_config()).await;
    let memo = service.create_and_select("stable").await.expect("create failed");

    backend.failing.store(true, Ordering::SeqCst);
    let before = backend.writes.load(Ordering::SeqCst);
    service.edit_current("unsaved");

    // debounce + 1s + 2s + 4s backoff
    advance(1000 + 1000 + 2000 + 4000 + 10).await;
    assert_eq!(service.status(), SaveStatus::Error);
    assert_eq!(backend.writes.load(Ordering::SeqCst), before + 4);

    // No automatic attempts after giving up
    advance(60_000).await;
    assert_eq!(backend.writes.load(Ordering::SeqCst), before + 4);

    // The optimistic value is still what the user sees
    assert_eq!(service.current().unwrap().content, "unsaved");

    backend.failing.store(false, Ordering::SeqCst);
    service.edit_current("unsaved, again");
    advance(1001).await;
    assert_eq!(service.status(), SaveStatus::Saved);
    let stored = service.store().get_by_id(memo.id.as_str()).await.unwrap().unwrap();
    assert_eq!(stored.content, "unsaved, again");
}

// =========================================================================
// Views, selection and deletion
// =========================================================================

#[tokio::test]
async fn test_filtered_view_most_recent_first() {
    let service = service_over(Arc::new(MemoryBackend::new()), paused_config()).await;

    let a = service.create_and_select("Note A").await.expect("create failed");
    let b = service.create_and_select("Note B").await.expect("create failed");

    let all: Vec<_> = service.filtered_view("").into_iter().map(|m| m.id).collect();
    assert_eq!(all, vec![b.id, a.id.clone()]);

    let hits: Vec<_> = service.filtered_view("A").into_iter().map(|m| m.id).collect();
    assert_eq!(hits, vec![a.id]);
}

#[tokio::test]
async fn test_delete_current_clears_selection() {
    let service = service_over(Arc::new(MemoryBackend::new()), paused_config()).await;
    let keep = service.create_and_select("keep me").await.expect("create failed");
    let gone = service.create_and_select("delete me").await.expect("create failed");
    assert_eq!(service.current_id(), Some(gone.id.clone()));

    service.delete(gone.id.as_str()).await.expect("delete failed");

    assert!(service.current().is_none());
    let remaining: Vec<_> = service.filtered_view("").into_iter().map(|m| m.id).collect();
    assert_eq!(remaining, vec![keep.id]);
    assert!(service.store().get_by_id(gone.id.as_str()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_other_memo_keeps_selection() {
    let service = service_over(Arc::new(MemoryBackend::new()), paused_config()).await;
    let other = service.create_and_select("other").await.expect("create failed");
    let current = service.create_and_select("current").await.expect("create failed");

    service.delete(other.id.as_str()).await.expect("delete failed");
    assert_eq!(service.current_id(), Some(current.id));
}

// =========================================================================
// Store invariants
// =========================================================================

#[tokio::test]
async fn test_update_is_idempotent_apart_from_timestamp() {
    let backend = Arc::new(MemoryBackend::new());
    let store = MemoStore::new(backend, StoreConfig::default());
    let memo = store.create("draft").await.expect("create failed");

    let first = store.update(memo.id.as_str(), MemoPatch::content("x")).await.unwrap();
    let second = store.update(memo.id.as_str(), MemoPatch::content("x")).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.content, second.content);
    assert_eq!(first.created_at, second.created_at);
    assert!(second.updated_at >= first.updated_at);

    let all = store.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0], second);
}

#[tokio::test]
async fn test_quota_rejection_keeps_prior_state() {
    let backend = Arc::new(MemoryBackend::new());
    let store = MemoStore::new(
        backend,
        StoreConfig {
            storage_key: STORAGE_KEY.to_string(),
            quota_bytes: 512,
        },
    );
    store.create("small").await.expect("create failed");
    let before = store.list_all().await.unwrap();
    let size_before = store.size_estimate().await.unwrap();

    let err = store.create(&"x".repeat(1024)).await.unwrap_err();
    assert_eq!(err.kind(), StorageErrorKind::QuotaExceeded);

    assert_eq!(store.list_all().await.unwrap(), before);
    assert_eq!(store.size_estimate().await.unwrap(), size_before);
}

#[tokio::test]
async fn test_corrupt_record_fails_whole_load() {
    let backend = Arc::new(MemoryBackend::new());
    let records = json!([
        {
            "id": "0b8f6c1e-7d4a-4c2b-9e3f-1a2b3c4d5e6f",
            "content": "fine",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z"
        },
        {
            "id": "memo-2",
            "content": "bad id",
            "createdAt": "2026-01-01T00:00:00Z",
            "updatedAt": "2026-01-01T00:00:00Z"
        }
    ]);
    backend.insert_raw(STORAGE_KEY, serde_json::to_vec(&records).unwrap());

    let service = service_over(backend, paused_config()).await;

    assert!(service.memos().is_empty(), "No partial recovery");
    let error = service.error().expect("Load failure should be surfaced");
    assert_eq!(error.kind, StorageErrorKind::ParseError);

    service.reset_corrupted().await.expect("reset failed");
    assert!(service.error().is_none());
    assert!(service.store().list_all().await.unwrap().is_empty());
}

// =========================================================================
// Durable backends
// =========================================================================

#[tokio::test]
async fn test_file_backend_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let memo_id = {
        let backend = Arc::new(FileBackend::new(temp_dir.path()).expect("Failed to open backend"));
        let service = service_over(backend, real_time_config()).await;
        let memo = service.create_and_select("").await.expect("create failed");

        service.edit_current("written before shutdown");
        service.handle_host_signal(HostSignal::Ending);
        wait_for_saved(&service).await;
        memo.id
    };

    let backend = Arc::new(FileBackend::new(temp_dir.path()).expect("Failed to reopen backend"));
    let service = service_over(backend, real_time_config()).await;

    assert!(service.error().is_none());
    let memos = service.memos();
    assert_eq!(memos.len(), 1);
    assert_eq!(memos[0].id, memo_id);
    assert_eq!(memos[0].content, "written before shutdown");
}

#[tokio::test]
async fn test_sqlite_backend_survives_restart() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("memos.db");
    let db_path = db_path.to_str().unwrap();

    {
        let backend = Arc::new(SqliteBackend::open(db_path).expect("Failed to open database"));
        let service = service_over(backend, real_time_config()).await;
        service.create_and_select("first").await.expect("create failed");
        service.create_and_select("second").await.expect("create failed");
        service.edit_current("second, edited");
        wait_for_saved(&service).await;
    }

    let backend = Arc::new(SqliteBackend::open(db_path).expect("Failed to reopen database"));
    let service = service_over(backend, real_time_config()).await;
    let contents: Vec<_> = service.memos().into_iter().map(|m| m.content).collect();
    assert_eq!(contents, vec!["second, edited", "first"]);
}

// =========================================================================
// Export and import
// =========================================================================

#[tokio::test]
async fn test_export_json_imports_into_fresh_store() {
    let source = service_over(Arc::new(MemoryBackend::new()), paused_config()).await;
    source.create_and_select("alpha\nbody").await.expect("create failed");
    source.create_and_select("   ").await.expect("create failed");

    let markdown = source.export(ExportFormat::Markdown).expect("export failed");
    assert!(markdown.contains("## alpha"));
    assert!(markdown.contains("## Untitled memo"));
    assert_eq!(markdown.matches("\n---\n").count(), 1);

    let json = source.export(ExportFormat::Json).expect("export failed");
    let target = service_over(Arc::new(MemoryBackend::new()), paused_config()).await;
    let summary = target.import_json(json.as_bytes()).await.expect("import failed");
    assert_eq!(summary.added, 2);

    assert_eq!(target.memos(), source.memos());

    // Importing the same export again changes nothing
    let again = target.import_json(json.as_bytes()).await.expect("import failed");
    assert_eq!(again.added, 0);
    assert_eq!(again.unchanged, 2);
}
