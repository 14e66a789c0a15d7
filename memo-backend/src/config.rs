use std::env;
use std::path::PathBuf;
use std::time::Duration;
use strum::{AsRefStr, EnumString};

/// Environment variable names - single source of truth
pub mod env_vars {
    /// Storage backend: "memory", "file" or "sqlite"
    pub const BACKEND: &str = "MEMO_BACKEND";
    pub const DATA_DIR: &str = "MEMO_DATA_DIR";
    /// Key the whole memo collection is stored under
    pub const STORAGE_KEY: &str = "MEMO_STORAGE_KEY";
    pub const QUOTA_BYTES: &str = "MEMO_QUOTA_BYTES";
    pub const SAVE_DEBOUNCE_MS: &str = "MEMO_SAVE_DEBOUNCE_MS";
    pub const SEARCH_DEBOUNCE_MS: &str = "MEMO_SEARCH_DEBOUNCE_MS";
    pub const MAX_RETRIES: &str = "MEMO_MAX_RETRIES";
    pub const BACKOFF_BASE_MS: &str = "MEMO_BACKOFF_BASE_MS";
    pub const BACKOFF_CAP_MS: &str = "MEMO_BACKOFF_CAP_MS";
}

/// Default values
pub mod defaults {
    pub const BACKEND: &str = "file";
    pub const DATA_DIR: &str = "./.memo";
    pub const STORAGE_KEY: &str = "memos";
    pub const SQLITE_FILE: &str = "memos.db";
    /// 5 MiB
    pub const QUOTA_BYTES: usize = 5 * 1024 * 1024;
    pub const SAVE_DEBOUNCE_MS: u64 = 1000;
    pub const SEARCH_DEBOUNCE_MS: u64 = 300;
    pub const MAX_RETRIES: u32 = 3;
    pub const BACKOFF_BASE_MS: u64 = 1000;
    pub const BACKOFF_CAP_MS: u64 = 10_000;
}

/// Which host key-value store backs the memo collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BackendKind {
    Memory,
    File,
    Sqlite,
}

/// Settings for `MemoStore`
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Key of the single stored value
    pub storage_key: String,
    /// Maximum serialized size of the full collection
    pub quota_bytes: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: defaults::STORAGE_KEY.to_string(),
            quota_bytes: defaults::QUOTA_BYTES,
        }
    }
}

/// Settings for the autosave scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Wait this long after the last edit before committing (default: 1000ms)
    pub debounce: Duration,
    /// Retries after the first failed attempt (default: 3)
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry (default: 1000ms)
    pub backoff_base: Duration,
    /// Upper bound on any single retry delay (default: 10000ms)
    pub backoff_cap: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(defaults::SAVE_DEBOUNCE_MS),
            max_retries: defaults::MAX_RETRIES,
            backoff_base: Duration::from_millis(defaults::BACKOFF_BASE_MS),
            backoff_cap: Duration::from_millis(defaults::BACKOFF_CAP_MS),
        }
    }
}

impl SchedulerConfig {
    /// Delay before retry number `retry` (1-based): `min(base * 2^(retry-1), cap)`
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.backoff_base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.backoff_cap)
            .min(self.backoff_cap)
    }
}

/// Settings for `MemoService`
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Wait this long after the last search keystroke before filtering (default: 300ms)
    pub search_debounce: Duration,
    pub scheduler: SchedulerConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            search_debounce: Duration::from_millis(defaults::SEARCH_DEBOUNCE_MS),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Full host configuration
#[derive(Debug, Clone)]
pub struct MemoConfig {
    pub backend: BackendKind,
    pub data_dir: PathBuf,
    pub store: StoreConfig,
    pub service: ServiceConfig,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            data_dir: PathBuf::from(defaults::DATA_DIR),
            store: StoreConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl MemoConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Invalid values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup(env_vars::BACKEND)
            .unwrap_or_else(|| defaults::BACKEND.to_string());
        let backend = backend.trim().parse().unwrap_or_else(|_| {
            log::warn!(
                "Unknown {} '{}', falling back to '{}'",
                env_vars::BACKEND,
                backend,
                defaults::BACKEND
            );
            BackendKind::File
        });

        let data_dir = lookup(env_vars::DATA_DIR)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| defaults::DATA_DIR.to_string());

        let storage_key = lookup(env_vars::STORAGE_KEY)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| defaults::STORAGE_KEY.to_string());

        let millis = |name: &str, default: u64| Duration::from_millis(parse_or(&lookup, name, default));

        Self {
            backend,
            data_dir: PathBuf::from(data_dir),
            store: StoreConfig {
                storage_key,
                quota_bytes: parse_or(&lookup, env_vars::QUOTA_BYTES, defaults::QUOTA_BYTES),
            },
            service: ServiceConfig {
                search_debounce: millis(env_vars::SEARCH_DEBOUNCE_MS, defaults::SEARCH_DEBOUNCE_MS),
                scheduler: SchedulerConfig {
                    debounce: millis(env_vars::SAVE_DEBOUNCE_MS, defaults::SAVE_DEBOUNCE_MS),
                    max_retries: parse_or(&lookup, env_vars::MAX_RETRIES, defaults::MAX_RETRIES),
                    backoff_base: millis(env_vars::BACKOFF_BASE_MS, defaults::BACKOFF_BASE_MS),
                    backoff_cap: millis(env_vars::BACKOFF_CAP_MS, defaults::BACKOFF_CAP_MS),
                },
            },
        }
    }

    /// Path of the SQLite database used by the sqlite backend
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join(defaults::SQLITE_FILE)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(name) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid {} '{}', using default {}", name, raw, default);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> MemoConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MemoConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.store.storage_key, "memos");
        assert_eq!(config.store.quota_bytes, 5 * 1024 * 1024);
        assert_eq!(config.service.search_debounce, Duration::from_millis(300));
        assert_eq!(config.service.scheduler, SchedulerConfig::default());
        assert!(config.service.search_debounce < config.service.scheduler.debounce);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = config_from(&[
            (env_vars::BACKEND, "SQLite"),
            (env_vars::DATA_DIR, "/tmp/memo-test"),
            (env_vars::QUOTA_BYTES, "2048"),
            (env_vars::SAVE_DEBOUNCE_MS, "250"),
            (env_vars::MAX_RETRIES, "5"),
        ]);
        assert_eq!(config.backend, BackendKind::Sqlite);
        assert_eq!(config.sqlite_path(), PathBuf::from("/tmp/memo-test/memos.db"));
        assert_eq!(config.store.quota_bytes, 2048);
        assert_eq!(config.service.scheduler.debounce, Duration::from_millis(250));
        assert_eq!(config.service.scheduler.max_retries, 5);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config_from(&[
            (env_vars::BACKEND, "cloud"),
            (env_vars::QUOTA_BYTES, "lots"),
            (env_vars::MAX_RETRIES, "-1"),
            (env_vars::STORAGE_KEY, "   "),
        ]);
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.store.quota_bytes, defaults::QUOTA_BYTES);
        assert_eq!(config.service.scheduler.max_retries, defaults::MAX_RETRIES);
        assert_eq!(config.store.storage_key, defaults::STORAGE_KEY);
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let config = SchedulerConfig {
            debounce: Duration::from_millis(100),
            max_retries: 10,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_millis(5000),
        };
        assert_eq!(config.backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(2000));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(config.backoff_delay(4), Duration::from_millis(5000));
        assert_eq!(config.backoff_delay(40), Duration::from_millis(5000));
    }
}
