use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;

use memo_backend::config::MemoConfig;
use memo_backend::service::{HostSignal, MemoService};
use memo_backend::storage::{self, MemoStore};

/// Time given to flushed commits before the process exits
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    log::info!("memo-backend v{}", env!("CARGO_PKG_VERSION"));

    let config = MemoConfig::from_env();
    let backend = match storage::open_backend(&config) {
        Ok(backend) => backend,
        Err(e) => {
            log::error!("Failed to open storage backend: {}", e);
            std::process::exit(1);
        }
    };

    let store = Arc::new(MemoStore::new(backend, config.store.clone()));
    let service = MemoService::new(store, config.service.clone());
    service.start().await;

    if let Some(err) = service.error() {
        log::error!("Memos could not be loaded ({}); starting with an empty list", err);
    }

    match service.quota_usage().await {
        Ok(usage) => log::info!(
            "Loaded {} memos, {} of {} bytes used ({:.1}%)",
            service.memos().len(),
            usage.used_bytes,
            usage.quota_bytes,
            usage.percent()
        ),
        Err(e) => log::warn!("Could not read storage usage: {}", e),
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
    }
    log::info!("Received Ctrl+C, shutting down...");

    service.handle_host_signal(HostSignal::Ending);
    tokio::time::sleep(SHUTDOWN_GRACE).await;

    log::info!("Shutdown complete");
}
