//! Sync configuration loaded from environment variables.

use std::path::PathBuf;

/// Configuration for the metadata sync subsystem.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Registry API base URL (default: `https://civitai.com/api`).
    pub registry_base_url: String,
    /// Optional registry credential. Its presence lowers the request
    /// pacing interval from 1000 ms to 200 ms.
    pub registry_api_token: Option<String>,
    /// Bounded worker count for parallel asset hashing (default: `4`).
    pub hash_concurrency: usize,
    /// Where the cache snapshot file lives, if persistence is wanted.
    pub snapshot_path: Option<PathBuf>,
}

impl SyncConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                   |
    /// |-------------------------|---------------------------|
    /// | `REGISTRY_BASE_URL`     | `https://civitai.com/api` |
    /// | `REGISTRY_API_TOKEN`    | unset                     |
    /// | `SYNC_HASH_CONCURRENCY` | `4`                       |
    /// | `METADATA_CACHE_PATH`   | unset (no persistence)    |
    pub fn from_env() -> Self {
        let registry_base_url = std::env::var("REGISTRY_BASE_URL")
            .unwrap_or_else(|_| "https://civitai.com/api".into());

        let registry_api_token = std::env::var("REGISTRY_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let hash_concurrency: usize = std::env::var("SYNC_HASH_CONCURRENCY")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("SYNC_HASH_CONCURRENCY must be a valid usize");

        let snapshot_path = std::env::var("METADATA_CACHE_PATH").ok().map(PathBuf::from);

        Self {
            registry_base_url,
            registry_api_token,
            hash_concurrency,
            snapshot_path,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            registry_base_url: "https://civitai.com/api".into(),
            registry_api_token: None,
            hash_concurrency: 4,
            snapshot_path: None,
        }
    }
}
