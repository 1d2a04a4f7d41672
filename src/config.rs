//! Configuration Module
//!
//! Loads data-layer settings from environment variables.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, FileStore, DEFAULT_QUOTA_BYTES};
use crate::error::{Error, Result};

/// Data-layer configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Lifetime of every cache entry in milliseconds
    pub cache_ttl_ms: u64,
    /// Directory holding persisted cache slots
    pub storage_dir: PathBuf,
    /// Size limit across all slots in bytes
    pub quota_bytes: usize,
    /// Base URL of the backend REST API
    pub api_base_url: String,
    /// Per-request timeout in seconds
    pub api_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_storage_dir() -> PathBuf {
    FileStore::default_dir().unwrap_or_else(|| PathBuf::from(".storefront-cache"))
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_MS` - Entry lifetime (default: 300000, five minutes)
    /// - `CACHE_STORAGE_DIR` - Slot directory (default: per-user cache dir)
    /// - `CACHE_QUOTA_BYTES` - Storage limit (default: 5 MiB)
    /// - `API_BASE_URL` - Backend URL (default: http://localhost:8080/api)
    /// - `API_TIMEOUT_SECS` - Request timeout (default: 30)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl_ms: env_or("CACHE_TTL_MS", defaults.cache_ttl_ms),
            storage_dir: env::var("CACHE_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            quota_bytes: env_or("CACHE_QUOTA_BYTES", defaults.quota_bytes),
            api_base_url: env::var("API_BASE_URL").unwrap_or(defaults.api_base_url),
            api_timeout_secs: env_or("API_TIMEOUT_SECS", defaults.api_timeout_secs),
        }
    }

    /// Rejects values that would make the cache or client useless.
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_ms == 0 {
            return Err(Error::Config("CACHE_TTL_MS must be greater than zero".to_string()));
        }
        if self.api_timeout_secs == 0 {
            return Err(Error::Config("API_TIMEOUT_SECS must be greater than zero".to_string()));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "API_BASE_URL '{}' is not an http(s) URL",
                self.api_base_url
            )));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn file_store(&self) -> FileStore {
        FileStore::new(self.storage_dir.clone()).with_quota(self.quota_bytes)
    }

    /// Opens the file-backed cache persisted under `storage_key`.
    pub fn open_cache(&self, storage_key: &str) -> Cache {
        Cache::new(storage_key, self.ttl(), Arc::new(self.file_store()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5 * 60 * 1000,
            storage_dir: default_storage_dir(),
            quota_bytes: DEFAULT_QUOTA_BYTES,
            api_base_url: "http://localhost:8080/api".to_string(),
            api_timeout_secs: 30,
        }
    }
}
