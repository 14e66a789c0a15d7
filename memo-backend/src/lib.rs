//! Persistence and autosave core for a single-user memo notebook.
//!
//! - [`storage`]: validated CRUD over a host key-value byte store
//! - [`autosave`]: debounced, retried commits with an observable status
//! - [`search`]: substring matching for the filtered view
//! - [`service`]: the orchestrator the presentation layer talks to

pub mod autosave;
pub mod config;
pub mod search;
pub mod service;
pub mod storage;

pub use autosave::{Committer, SaveScheduler, SaveSnapshot};
pub use config::MemoConfig;
pub use service::{HostSignal, MemoService, QuotaUsage, ServiceError};
pub use storage::{MemoStore, StorageError, StorageErrorKind, StorageResult};

pub use memo_types::{ExportFormat, Memo, MemoDraft, MemoId, MemoPatch, SaveStatus};
