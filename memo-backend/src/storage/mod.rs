//! Persistence layer — validated memo CRUD over a host key-value byte store
//!
//! `MemoStore` owns the collection format and its invariants; backends only
//! move opaque bytes. The in-process `MemoryBackend`, the file-per-key
//! `FileBackend`, and the SQLite `SqliteBackend` all satisfy the same
//! atomic-replace contract.

pub mod backend;
pub mod codec;
pub mod error;
pub mod file_backend;
pub mod sqlite_backend;
pub mod store;

use std::sync::Arc;

use crate::config::{BackendKind, MemoConfig};

pub use backend::{KeyValueBackend, MemoryBackend};
pub use error::{StorageError, StorageErrorKind, StorageResult};
pub use file_backend::FileBackend;
pub use sqlite_backend::SqliteBackend;
pub use store::{ImportSummary, MemoStore};

/// Build the backend selected by `config`, creating its data directory if needed
pub fn open_backend(config: &MemoConfig) -> StorageResult<Arc<dyn KeyValueBackend>> {
    let backend: Arc<dyn KeyValueBackend> = match config.backend {
        BackendKind::Memory => Arc::new(MemoryBackend::new()),
        BackendKind::File => Arc::new(FileBackend::new(config.data_dir.clone()).map_err(|e| {
            StorageError::unknown(format!(
                "Failed to prepare data directory {}",
                config.data_dir.display()
            ))
            .with_cause(e)
        })?),
        BackendKind::Sqlite => {
            std::fs::create_dir_all(&config.data_dir).map_err(|e| {
                StorageError::unknown(format!(
                    "Failed to prepare data directory {}",
                    config.data_dir.display()
                ))
                .with_cause(e)
            })?;
            let path = config.sqlite_path();
            Arc::new(SqliteBackend::open(&path.to_string_lossy()).map_err(|e| {
                StorageError::unknown(format!("Failed to open database {}", path.display())).with_cause(e)
            })?)
        }
    };

    log::info!(
        "[BACKEND] Using {} backend ({})",
        backend.name(),
        config.data_dir.display()
    );
    Ok(backend)
}
