//! End-to-end sync flow over the public API: directory inventory,
//! fingerprinting, registry lookups, cache queries, and persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use atelier_core::hashing::sha256_hex;
use atelier_registry::{AssetMetadata, RegistryError, RegistryLookup};
use atelier_sync::cache::CacheQuery;
use atelier_sync::config::SyncConfig;
use atelier_sync::inventory::DirInventory;
use atelier_sync::orchestrator::MetadataSource;
use atelier_sync::session::SyncStatus;
use atelier_sync::{MetadataCacheStore, SyncOrchestrator};

/// Registry stub keyed by content hash, with an optional gate that holds
/// every lookup until released.
struct StubRegistry {
    responses: Mutex<HashMap<String, AssetMetadata>>,
    calls: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl StubRegistry {
    fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    fn with_model(self, file_contents: &str, name: &str, base_model: &str) -> Self {
        let metadata = AssetMetadata {
            name: name.to_string(),
            model_name: Some(format!("{name} (model)")),
            description: None,
            base_model: Some(base_model.to_string()),
            trained_words: vec![name.to_lowercase().replace(' ', "_")],
            preview_images: Vec::new(),
            nsfw: false,
            source_url: None,
        };
        self.responses
            .lock()
            .unwrap()
            .insert(sha256_hex(file_contents.as_bytes()), metadata);
        self
    }
}

#[async_trait]
impl MetadataSource for StubRegistry {
    async fn fetch_metadata(&self, hash: &str) -> Result<RegistryLookup, RegistryError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().get(hash) {
            Some(metadata) => Ok(RegistryLookup::Found(metadata.clone())),
            None => Ok(RegistryLookup::NotFound),
        }
    }
}

fn populate_models(dir: &std::path::Path, files: &[&str]) {
    for name in files {
        std::fs::write(dir.join(name), name.as_bytes()).unwrap();
    }
}

fn build(
    models_dir: &std::path::Path,
    registry: StubRegistry,
    cache: MetadataCacheStore,
) -> (Arc<SyncOrchestrator>, Arc<StubRegistry>) {
    let inventory = DirInventory::new().with_root(1, models_dir);
    let registry = Arc::new(registry);
    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::new(inventory),
        Arc::clone(&registry) as Arc<dyn MetadataSource>,
        Arc::new(cache),
        SyncConfig::default(),
    ));
    (orchestrator, registry)
}

#[tokio::test]
async fn full_pass_builds_a_queryable_cache() {
    let dir = tempfile::tempdir().unwrap();
    populate_models(
        dir.path(),
        &["fox.safetensors", "cat.safetensors", "mystery.ckpt"],
    );
    let registry = StubRegistry::new()
        .with_model("fox.safetensors", "Fox Girl", "SDXL 1.0")
        .with_model("cat.safetensors", "Cat Girl", "SD 1.5");
    let (orchestrator, _) = build(dir.path(), registry, MetadataCacheStore::new());

    let session = orchestrator.sync_server(1, false).await;
    assert_eq!(session.status, SyncStatus::Completed);

    let report = orchestrator.status(1).await;
    assert_eq!(report.total_assets, 3);
    assert_eq!(report.assets_with_metadata, 2);

    // Unfiltered query lists everything, misses included.
    let all = orchestrator.cache().query(1, &CacheQuery::default()).await;
    assert_eq!(all.pagination.total, 3);
    assert_eq!(all.available_base_models, vec!["SD 1.5", "SDXL 1.0"]);

    // Search hits trained words.
    let foxes = orchestrator
        .cache()
        .query(
            1,
            &CacheQuery {
                search: Some("fox_girl".into()),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(foxes.pagination.total, 1);
    assert_eq!(foxes.items[0].metadata.as_ref().unwrap().name, "Fox Girl");

    // Base-model filter.
    let sd15 = orchestrator
        .cache()
        .query(
            1,
            &CacheQuery {
                base_model: Some("SD 1.5".into()),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(sd15.pagination.total, 1);
}

#[tokio::test]
async fn repeat_passes_only_query_new_hashes() {
    let dir = tempfile::tempdir().unwrap();
    populate_models(dir.path(), &["fox.safetensors"]);
    let registry = StubRegistry::new().with_model("fox.safetensors", "Fox Girl", "SDXL 1.0");
    let (orchestrator, registry) = build(dir.path(), registry, MetadataCacheStore::new());

    orchestrator.sync_server(1, false).await;
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);

    // New file appears; only its hash is fetched.
    populate_models(dir.path(), &["cat.safetensors"]);
    orchestrator.sync_server(1, false).await;
    assert_eq!(registry.calls.load(Ordering::SeqCst), 2);

    // Nothing new: registry untouched, misses stay negative-cached.
    orchestrator.sync_server(1, false).await;
    assert_eq!(registry.calls.load(Ordering::SeqCst), 2);

    // Forced refresh re-queries every hash.
    orchestrator.sync_server(1, true).await;
    assert_eq!(registry.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn concurrent_trigger_is_single_flight() {
    let dir = tempfile::tempdir().unwrap();
    populate_models(dir.path(), &["fox.safetensors"]);

    let gate = Arc::new(Notify::new());
    let registry = StubRegistry::gated(Arc::clone(&gate));
    let (orchestrator, registry) = build(dir.path(), registry, MetadataCacheStore::new());

    let first = orchestrator.trigger(1, false);
    assert_eq!(first.status, SyncStatus::Fetching);

    // Wait until the pass is parked on the registry gate, then re-trigger.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = orchestrator.trigger(1, false);
    assert_eq!(second.status, SyncStatus::Fetching);

    gate.notify_one();
    for _ in 0..100 {
        if orchestrator.status(1).await.status != SyncStatus::Fetching {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let report = orchestrator.status(1).await;
    assert_eq!(report.status, SyncStatus::Completed);
    // One pass ran, not two.
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_survives_a_restart_through_the_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    std::fs::create_dir(&models).unwrap();
    populate_models(&models, &["fox.safetensors"]);
    let snapshot = dir.path().join("cache.json");

    {
        let registry = StubRegistry::new().with_model("fox.safetensors", "Fox Girl", "SDXL 1.0");
        let (orchestrator, _) =
            build(&models, registry, MetadataCacheStore::with_snapshot(&snapshot));
        let session = orchestrator.sync_server(1, false).await;
        assert_eq!(session.status, SyncStatus::Completed);
    }

    // "Restart": fresh orchestrator loads the snapshot; the registry is
    // never consulted for already-cached hashes.
    let registry = StubRegistry::new();
    let (orchestrator, registry) =
        build(&models, registry, MetadataCacheStore::with_snapshot(&snapshot));
    orchestrator.cache().load().await.unwrap();

    let session = orchestrator.sync_server(1, false).await;
    assert_eq!(session.status, SyncStatus::Completed);
    assert_eq!(registry.calls.load(Ordering::SeqCst), 0);

    let entry = orchestrator
        .cache()
        .get(1, &sha256_hex(b"fox.safetensors"))
        .await
        .unwrap();
    assert_eq!(entry.metadata.unwrap().name, "Fox Girl");
}

#[tokio::test]
async fn renamed_file_keeps_its_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    populate_models(dir.path(), &["fox.safetensors"]);
    let registry = StubRegistry::new().with_model("fox.safetensors", "Fox Girl", "SDXL 1.0");
    let (orchestrator, registry) = build(dir.path(), registry, MetadataCacheStore::new());

    orchestrator.sync_server(1, false).await;
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);

    // Same bytes, new name: the content hash is the cache key, so no
    // registry traffic.
    std::fs::rename(
        dir.path().join("fox.safetensors"),
        dir.path().join("renamed.safetensors"),
    )
    .unwrap();
    let session = orchestrator.sync_server(1, false).await;
    assert_eq!(session.status, SyncStatus::Completed);
    assert_eq!(registry.calls.load(Ordering::SeqCst), 1);
}
