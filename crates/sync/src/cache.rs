//! Persisted metadata cache: content hash -> registry metadata, per server.
//!
//! A "not found" answer from the registry is still cached (negative
//! caching) so the same miss is not re-queried on every pass; it is only
//! retried when the asset's hash changes or an operator forces a refresh.
//! Staleness is exposed through `fetched_at`, never enforced: the store
//! does not auto-evict, callers decide when to trigger a sync.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use atelier_core::types::{ServerId, Timestamp};
use atelier_registry::AssetMetadata;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Default page size for cache queries.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Maximum page size a caller may request.
pub const MAX_PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One cached lookup result, keyed by content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataCacheEntry {
    pub content_hash: String,
    /// `false` records a registry miss (negative caching).
    pub found: bool,
    /// Registry metadata; `None` when `found` is `false`.
    pub metadata: Option<AssetMetadata>,
    /// Last filename the hash was seen under, for display and search.
    pub filename: Option<String>,
    pub fetched_at: Timestamp,
}

impl MetadataCacheEntry {
    /// Record a successful registry lookup.
    pub fn found(content_hash: String, filename: Option<String>, metadata: AssetMetadata) -> Self {
        Self {
            content_hash,
            found: true,
            metadata: Some(metadata),
            filename,
            fetched_at: chrono::Utc::now(),
        }
    }

    /// Record a registry miss.
    pub fn not_found(content_hash: String, filename: Option<String>) -> Self {
        Self {
            content_hash,
            found: false,
            metadata: None,
            filename,
            fetched_at: chrono::Utc::now(),
        }
    }

    /// Whether the entry is older than `max_age`.
    pub fn is_stale(&self, max_age: chrono::Duration) -> bool {
        chrono::Utc::now() - self.fetched_at > max_age
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Parameters for a paginated cache query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheQuery {
    /// Case-insensitive match against name, description, trained words,
    /// and filename.
    pub search: Option<String>,
    /// Exact match against the cached `base_model` field.
    pub base_model: Option<String>,
    /// 1-based page number.
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

/// Pagination envelope of a query response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current: usize,
    pub pages: usize,
    pub total: usize,
}

/// Result of a cache query.
#[derive(Debug, Clone, Serialize)]
pub struct CacheQueryResult {
    pub items: Vec<MetadataCacheEntry>,
    pub pagination: Pagination,
    /// Distinct base models present in the server's cache, for filter UIs.
    pub available_base_models: Vec<String>,
}

/// Aggregate counts used by the sync status report.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub entries_with_metadata: usize,
    pub last_fetched_at: Option<Timestamp>,
}

/// Snapshot persistence failure.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache snapshot I/O failed: {0}")]
    Io(String),

    #[error("Cache snapshot decode failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

type EntryMap = HashMap<ServerId, HashMap<String, MetadataCacheEntry>>;

/// In-memory cache with optional JSON snapshot persistence.
pub struct MetadataCacheStore {
    entries: RwLock<EntryMap>,
    snapshot_path: Option<PathBuf>,
}

impl MetadataCacheStore {
    /// Create an unpersisted store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            snapshot_path: None,
        }
    }

    /// Create a store that persists to a JSON snapshot file.
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            snapshot_path: Some(path.into()),
        }
    }

    /// Load the snapshot file, if configured and present.
    pub async fn load(&self) -> Result<(), CacheError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))?;
        let loaded: EntryMap =
            serde_json::from_slice(&bytes).map_err(|e| CacheError::Decode(e.to_string()))?;

        let mut entries = self.entries.write().await;
        *entries = loaded;
        Ok(())
    }

    /// Write the snapshot file, if configured.
    pub async fn persist(&self) -> Result<(), CacheError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let entries = self.entries.read().await;
        let bytes =
            serde_json::to_vec_pretty(&*entries).map_err(|e| CacheError::Decode(e.to_string()))?;
        drop(entries);

        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| CacheError::Io(e.to_string()))
    }

    /// Look up one entry.
    pub async fn get(&self, server_id: ServerId, hash: &str) -> Option<MetadataCacheEntry> {
        self.entries
            .read()
            .await
            .get(&server_id)
            .and_then(|m| m.get(hash))
            .cloned()
    }

    /// Insert or replace an entry.
    pub async fn upsert(&self, server_id: ServerId, entry: MetadataCacheEntry) {
        self.entries
            .write()
            .await
            .entry(server_id)
            .or_default()
            .insert(entry.content_hash.clone(), entry);
    }

    /// Aggregate counts for a server.
    pub async fn stats(&self, server_id: ServerId) -> CacheStats {
        let entries = self.entries.read().await;
        let Some(map) = entries.get(&server_id) else {
            return CacheStats::default();
        };
        CacheStats {
            total_entries: map.len(),
            entries_with_metadata: map.values().filter(|e| e.found).count(),
            last_fetched_at: map.values().map(|e| e.fetched_at).max(),
        }
    }

    /// Query a server's cache with search, base-model filter, and
    /// pagination. Results are sorted by display name.
    pub async fn query(&self, server_id: ServerId, query: &CacheQuery) -> CacheQueryResult {
        let entries = self.entries.read().await;
        let map = entries.get(&server_id);

        let mut available_base_models: Vec<String> = map
            .map(|m| {
                let mut models: Vec<String> = m
                    .values()
                    .filter_map(|e| e.metadata.as_ref()?.base_model.clone())
                    .collect();
                models.sort();
                models.dedup();
                models
            })
            .unwrap_or_default();
        available_base_models.dedup();

        let mut items: Vec<MetadataCacheEntry> = map
            .map(|m| {
                m.values()
                    .filter(|e| entry_matches(e, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        items.sort_by(|a, b| display_name(a).cmp(&display_name(b)));

        let total = items.len();
        let page_size = query
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let pages = total.div_ceil(page_size);
        let current = query.page.unwrap_or(1).max(1);

        let start = (current - 1).saturating_mul(page_size);
        let items = if start >= total {
            Vec::new()
        } else {
            items[start..(start + page_size).min(total)].to_vec()
        };

        CacheQueryResult {
            items,
            pagination: Pagination {
                current,
                pages,
                total,
            },
            available_base_models,
        }
    }
}

impl Default for MetadataCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort key for query results: metadata name, falling back to filename,
/// then hash.
fn display_name(entry: &MetadataCacheEntry) -> String {
    entry
        .metadata
        .as_ref()
        .map(|m| m.name.to_lowercase())
        .or_else(|| entry.filename.as_ref().map(|f| f.to_lowercase()))
        .unwrap_or_else(|| entry.content_hash.clone())
}

/// Apply search and base-model filters to one entry.
fn entry_matches(entry: &MetadataCacheEntry, query: &CacheQuery) -> bool {
    if let Some(base_model) = &query.base_model {
        let matches = entry
            .metadata
            .as_ref()
            .and_then(|m| m.base_model.as_deref())
            .is_some_and(|bm| bm == base_model);
        if !matches {
            return false;
        }
    }

    let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return true;
    };
    let needle = search.to_lowercase();

    if let Some(filename) = &entry.filename {
        if filename.to_lowercase().contains(&needle) {
            return true;
        }
    }
    let Some(meta) = &entry.metadata else {
        return false;
    };
    meta.name.to_lowercase().contains(&needle)
        || meta
            .model_name
            .as_ref()
            .is_some_and(|n| n.to_lowercase().contains(&needle))
        || meta
            .description
            .as_ref()
            .is_some_and(|d| d.to_lowercase().contains(&needle))
        || meta
            .trained_words
            .iter()
            .any(|w| w.to_lowercase().contains(&needle))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str, base_model: &str, words: &[&str]) -> AssetMetadata {
        AssetMetadata {
            name: name.to_string(),
            model_name: None,
            description: None,
            base_model: Some(base_model.to_string()),
            trained_words: words.iter().map(|w| w.to_string()).collect(),
            preview_images: Vec::new(),
            nsfw: false,
            source_url: None,
        }
    }

    async fn seeded_store() -> MetadataCacheStore {
        let store = MetadataCacheStore::new();
        store
            .upsert(
                1,
                MetadataCacheEntry::found(
                    "hash-a".into(),
                    Some("fox.safetensors".into()),
                    metadata("Fox LoRA", "SDXL 1.0", &["foxgirl"]),
                ),
            )
            .await;
        store
            .upsert(
                1,
                MetadataCacheEntry::found(
                    "hash-b".into(),
                    Some("cat.safetensors".into()),
                    metadata("Cat LoRA", "SD 1.5", &["catgirl"]),
                ),
            )
            .await;
        store
            .upsert(
                1,
                MetadataCacheEntry::not_found("hash-c".into(), Some("mystery.ckpt".into())),
            )
            .await;
        store
    }

    // -- upsert / get ---------------------------------------------------------

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let store = seeded_store().await;
        let entry = store.get(1, "hash-a").await.unwrap();
        assert!(entry.found);
        assert_eq!(entry.metadata.unwrap().name, "Fox LoRA");
    }

    #[tokio::test]
    async fn negative_result_is_cached() {
        let store = seeded_store().await;
        let entry = store.get(1, "hash-c").await.unwrap();
        assert!(!entry.found);
        assert!(entry.metadata.is_none());
    }

    #[tokio::test]
    async fn servers_are_isolated() {
        let store = seeded_store().await;
        assert!(store.get(2, "hash-a").await.is_none());
    }

    // -- query ----------------------------------------------------------------

    #[tokio::test]
    async fn query_returns_all_sorted_by_name() {
        let store = seeded_store().await;
        let result = store.query(1, &CacheQuery::default()).await;
        assert_eq!(result.pagination.total, 3);
        let names: Vec<String> = result.items.iter().map(display_name).collect();
        assert_eq!(names, vec!["cat lora", "fox lora", "mystery.ckpt"]);
    }

    #[tokio::test]
    async fn search_matches_trained_words_case_insensitively() {
        let store = seeded_store().await;
        let result = store
            .query(
                1,
                &CacheQuery {
                    search: Some("FOXGIRL".into()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(result.pagination.total, 1);
        assert_eq!(result.items[0].content_hash, "hash-a");
    }

    #[tokio::test]
    async fn search_matches_filename_for_negative_entries() {
        let store = seeded_store().await;
        let result = store
            .query(
                1,
                &CacheQuery {
                    search: Some("mystery".into()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(result.pagination.total, 1);
        assert!(!result.items[0].found);
    }

    #[tokio::test]
    async fn base_model_filter_is_exact() {
        let store = seeded_store().await;
        let result = store
            .query(
                1,
                &CacheQuery {
                    base_model: Some("SDXL 1.0".into()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(result.pagination.total, 1);
        assert_eq!(result.items[0].content_hash, "hash-a");

        let none = store
            .query(
                1,
                &CacheQuery {
                    base_model: Some("SDXL".into()),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(none.pagination.total, 0);
    }

    #[tokio::test]
    async fn available_base_models_lists_distinct_values() {
        let store = seeded_store().await;
        let result = store.query(1, &CacheQuery::default()).await;
        assert_eq!(result.available_base_models, vec!["SD 1.5", "SDXL 1.0"]);
    }

    #[tokio::test]
    async fn pagination_slices_and_counts_pages() {
        let store = seeded_store().await;
        let query = CacheQuery {
            page: Some(2),
            page_size: Some(2),
            ..Default::default()
        };
        let result = store.query(1, &query).await;
        assert_eq!(
            result.pagination,
            Pagination {
                current: 2,
                pages: 2,
                total: 3
            }
        );
        assert_eq!(result.items.len(), 1);
    }

    #[tokio::test]
    async fn page_past_end_returns_empty_items() {
        let store = seeded_store().await;
        let query = CacheQuery {
            page: Some(9),
            page_size: Some(2),
            ..Default::default()
        };
        let result = store.query(1, &query).await;
        assert!(result.items.is_empty());
        assert_eq!(result.pagination.total, 3);
    }

    // -- stats / staleness ----------------------------------------------------

    #[tokio::test]
    async fn stats_count_found_entries_only_as_with_metadata() {
        let store = seeded_store().await;
        let stats = store.stats(1).await;
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.entries_with_metadata, 2);
        assert!(stats.last_fetched_at.is_some());
    }

    #[test]
    fn staleness_is_exposed_not_enforced() {
        let mut entry = MetadataCacheEntry::not_found("h".into(), None);
        assert!(!entry.is_stale(chrono::Duration::hours(1)));
        entry.fetched_at = chrono::Utc::now() - chrono::Duration::hours(2);
        assert!(entry.is_stale(chrono::Duration::hours(1)));
    }

    // -- persistence ----------------------------------------------------------

    #[tokio::test]
    async fn snapshot_roundtrips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let store = MetadataCacheStore::with_snapshot(&path);
        store
            .upsert(
                1,
                MetadataCacheEntry::found(
                    "hash-a".into(),
                    None,
                    metadata("Fox LoRA", "SDXL 1.0", &[]),
                ),
            )
            .await;
        store.persist().await.unwrap();

        let reloaded = MetadataCacheStore::with_snapshot(&path);
        reloaded.load().await.unwrap();
        let entry = reloaded.get(1, "hash-a").await.unwrap();
        assert_eq!(entry.metadata.unwrap().name, "Fox LoRA");
    }

    #[tokio::test]
    async fn load_without_snapshot_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataCacheStore::with_snapshot(dir.path().join("absent.json"));
        store.load().await.unwrap();
        assert!(store.get(1, "x").await.is_none());
    }
}
