//! Sync orchestration: one background pass per trigger, per server.
//!
//! A pass inventories the server's model assets, fingerprints them with
//! bounded parallelism, then walks the hashes serially against the
//! registry (the pacer makes parallel fetches pointless). Cached hashes
//! are skipped unless the caller forces a refresh; registry misses are
//! negative-cached; registry failures of any kind skip the asset for this
//! pass and keep whatever the cache already holds. Only an inventory
//! enumeration failure fails the session.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use atelier_core::types::{ServerId, Timestamp};
use atelier_registry::{RegistryClient, RegistryError, RegistryLookup};

use crate::cache::{MetadataCacheEntry, MetadataCacheStore};
use crate::config::SyncConfig;
use crate::fingerprint::fingerprint_assets;
use crate::inventory::{AssetInventory, ModelAsset};
use crate::session::{
    SessionGuard, SessionRegistry, SyncProgress, SyncSession, SyncStatus, STAGE_FETCHING_METADATA,
    STAGE_HASHING,
};

// ---------------------------------------------------------------------------
// Metadata source
// ---------------------------------------------------------------------------

/// The registry collaborator, seam for tests and alternate registries.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch_metadata(&self, hash: &str) -> Result<RegistryLookup, RegistryError>;
}

#[async_trait]
impl MetadataSource for RegistryClient {
    async fn fetch_metadata(&self, hash: &str) -> Result<RegistryLookup, RegistryError> {
        RegistryClient::fetch_metadata(self, hash).await
    }
}

// ---------------------------------------------------------------------------
// Status report
// ---------------------------------------------------------------------------

/// Combined session and cache state for one server, shaped for API
/// consumers polling sync progress.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusReport {
    pub status: SyncStatus,
    pub progress: Option<SyncProgress>,
    pub total_assets: usize,
    pub assets_with_metadata: usize,
    pub last_registry_sync: Option<Timestamp>,
    pub error_message: Option<String>,
    pub registry_failures: usize,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives metadata sync passes and owns the collaborators they need.
pub struct SyncOrchestrator {
    inventory: Arc<dyn AssetInventory>,
    source: Arc<dyn MetadataSource>,
    cache: Arc<MetadataCacheStore>,
    sessions: Arc<SessionRegistry>,
    config: SyncConfig,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(
        inventory: Arc<dyn AssetInventory>,
        source: Arc<dyn MetadataSource>,
        cache: Arc<MetadataCacheStore>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inventory,
            source,
            cache,
            sessions: Arc::new(SessionRegistry::new()),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Build an orchestrator from configuration, wiring the real registry
    /// client.
    pub fn from_config(inventory: Arc<dyn AssetInventory>, config: SyncConfig) -> Self {
        let source = Arc::new(RegistryClient::new(
            config.registry_base_url.clone(),
            config.registry_api_token.clone(),
        ));
        let cache = match &config.snapshot_path {
            Some(path) => Arc::new(MetadataCacheStore::with_snapshot(path)),
            None => Arc::new(MetadataCacheStore::new()),
        };
        Self::new(inventory, source, cache, config)
    }

    pub fn cache(&self) -> &Arc<MetadataCacheStore> {
        &self.cache
    }

    /// Start a background sync pass for a server.
    ///
    /// Claims the server's sync slot and spawns the pass; if a sync is
    /// already in flight, no new work starts. Either way the returned
    /// snapshot reflects the session as of this call.
    pub fn trigger(self: &Arc<Self>, server_id: ServerId, force_refresh: bool) -> SyncSession {
        match self.sessions.begin(server_id) {
            Ok(guard) => {
                let orchestrator = Arc::clone(self);
                tokio::spawn(async move {
                    orchestrator.run_pass(guard, force_refresh).await;
                });
                self.sessions.snapshot(server_id)
            }
            Err(in_flight) => {
                tracing::debug!(server_id, "Sync already in flight, trigger ignored");
                in_flight
            }
        }
    }

    /// Run a sync pass inline, claiming the slot like [`Self::trigger`].
    /// Returns the finished session state.
    pub async fn sync_server(
        self: &Arc<Self>,
        server_id: ServerId,
        force_refresh: bool,
    ) -> SyncSession {
        match self.sessions.begin(server_id) {
            Ok(guard) => {
                self.run_pass(guard, force_refresh).await;
                self.sessions.snapshot(server_id)
            }
            Err(in_flight) => in_flight,
        }
    }

    /// Combined session and cache state for a server.
    pub async fn status(&self, server_id: ServerId) -> SyncStatusReport {
        let session = self.sessions.snapshot(server_id);
        let stats = self.cache.stats(server_id).await;
        SyncStatusReport {
            status: session.status,
            progress: session.progress,
            total_assets: stats.total_entries,
            assets_with_metadata: stats.entries_with_metadata,
            last_registry_sync: session.finished_at.or(stats.last_fetched_at),
            error_message: session.error_message,
            registry_failures: session.registry_failures,
        }
    }

    /// Cancel in-flight passes; used on shutdown. A cancelled pass
    /// finalizes its session as failed.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn run_pass(&self, guard: SessionGuard, force_refresh: bool) {
        let server_id = guard.server_id();
        tracing::info!(server_id, force_refresh, "Starting metadata sync pass");

        let assets = match self.inventory.list_assets(server_id).await {
            Ok(assets) => assets,
            Err(e) => {
                tracing::error!(server_id, error = %e, "Asset inventory failed");
                guard.fail(e.to_string());
                return;
            }
        };

        // Stage 1: fingerprint everything the inventory found.
        let total = assets.len();
        guard.update_progress(STAGE_HASHING, 0, total);
        let hashed = fingerprint_assets(assets, self.config.hash_concurrency, |done, _| {
            guard.update_progress(STAGE_HASHING, done, total);
        })
        .await;

        if self.cancel.is_cancelled() {
            guard.fail("Sync cancelled during shutdown");
            return;
        }

        // Stage 2: registry lookups, serialized behind the pacer. Progress
        // stays on the full asset count; hash-failed assets were already
        // attempted in stage 1.
        let candidates: Vec<(&ModelAsset, &str)> = hashed
            .iter()
            .filter_map(|a| a.content_hash.as_deref().map(|h| (a, h)))
            .collect();
        let attempted = total - candidates.len();
        guard.update_progress(STAGE_FETCHING_METADATA, attempted, total);

        for (done, (asset, hash)) in candidates.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                guard.fail("Sync cancelled during shutdown");
                return;
            }

            let cached = self.cache.get(server_id, hash).await;
            if cached.is_some() && !force_refresh {
                guard.update_progress(STAGE_FETCHING_METADATA, attempted + done + 1, total);
                continue;
            }

            match self.source.fetch_metadata(hash).await {
                Ok(RegistryLookup::Found(metadata)) => {
                    tracing::debug!(server_id, filename = %asset.filename, "Metadata found");
                    self.cache
                        .upsert(
                            server_id,
                            MetadataCacheEntry::found(
                                hash.to_string(),
                                Some(asset.filename.clone()),
                                metadata,
                            ),
                        )
                        .await;
                }
                Ok(RegistryLookup::NotFound) => {
                    self.cache
                        .upsert(
                            server_id,
                            MetadataCacheEntry::not_found(
                                hash.to_string(),
                                Some(asset.filename.clone()),
                            ),
                        )
                        .await;
                }
                Err(e) => {
                    // Per-asset fault, never session-fatal. Keep whatever
                    // the cache holds; transient failures retry on a later
                    // pass, terminal ones wait for a hash change or a
                    // forced refresh.
                    tracing::warn!(
                        server_id,
                        filename = %asset.filename,
                        transient = e.is_transient(),
                        error = %e,
                        "Registry lookup failed, skipping asset this pass",
                    );
                    guard.record_registry_failure();
                }
            }
            guard.update_progress(STAGE_FETCHING_METADATA, attempted + done + 1, total);
        }

        if let Err(e) = self.cache.persist().await {
            tracing::warn!(server_id, error = %e, "Cache snapshot write failed");
        }

        tracing::info!(server_id, assets = total, "Metadata sync pass finished");
        guard.complete();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
