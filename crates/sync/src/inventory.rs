//! Asset inventory: discovering the model assets present on a server.
//!
//! The inventory provider is an external collaborator behind the
//! [`AssetInventory`] trait. [`DirInventory`] is the built-in
//! implementation for servers whose model directory is locally mounted.
//! An inventory failure is the one session-level fault: if the asset list
//! cannot be enumerated at all, the whole sync session fails.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use atelier_core::types::ServerId;

/// File extensions recognized as model assets.
pub const ASSET_EXTENSIONS: &[&str] = &["safetensors", "ckpt", "pt"];

/// A model asset discovered by an inventory scan.
///
/// Ephemeral per sync pass; the content hash (once computed) is the
/// persistent cache key, so moving or renaming a file does not invalidate
/// its cache entry.
#[derive(Debug, Clone, Serialize)]
pub struct ModelAsset {
    pub server_id: ServerId,
    pub filename: String,
    pub path: PathBuf,
    /// Content fingerprint; `None` until hashing runs or if hashing failed.
    pub content_hash: Option<String>,
    /// Recorded hashing failure, if any. Non-fatal to the sync session.
    pub hash_error: Option<String>,
}

impl ModelAsset {
    pub fn discovered(server_id: ServerId, path: PathBuf) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            server_id,
            filename,
            path,
            content_hash: None,
            hash_error: None,
        }
    }
}

/// Inventory enumeration failure. Fails the whole sync session.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("No asset inventory configured for server {0}")]
    UnknownServer(ServerId),

    #[error("Failed to enumerate assets: {0}")]
    Unavailable(String),
}

/// The asset-inventory collaborator: returns a server's current asset
/// list on demand.
#[async_trait]
pub trait AssetInventory: Send + Sync {
    async fn list_assets(&self, server_id: ServerId) -> Result<Vec<ModelAsset>, InventoryError>;
}

/// Inventory over locally mounted model directories, one root per server.
pub struct DirInventory {
    roots: HashMap<ServerId, PathBuf>,
}

impl DirInventory {
    pub fn new() -> Self {
        Self {
            roots: HashMap::new(),
        }
    }

    /// Register the model directory for a server.
    pub fn with_root(mut self, server_id: ServerId, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(server_id, root.into());
        self
    }
}

impl Default for DirInventory {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a path looks like a model asset by extension.
fn is_asset_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ASSET_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl AssetInventory for DirInventory {
    async fn list_assets(&self, server_id: ServerId) -> Result<Vec<ModelAsset>, InventoryError> {
        let root = self
            .roots
            .get(&server_id)
            .ok_or(InventoryError::UnknownServer(server_id))?;

        let mut dir = tokio::fs::read_dir(root)
            .await
            .map_err(|e| InventoryError::Unavailable(format!("{}: {e}", root.display())))?;

        let mut assets = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.is_file() && is_asset_file(&path) {
                assets.push(ModelAsset::discovered(server_id, path));
            }
        }

        // Directory iteration order is platform-dependent; sort for
        // stable progress reporting.
        assets.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn recognizes_asset_extensions() {
        assert!(is_asset_file(Path::new("/models/a.safetensors")));
        assert!(is_asset_file(Path::new("/models/b.CKPT")));
        assert!(is_asset_file(Path::new("/models/c.pt")));
        assert!(!is_asset_file(Path::new("/models/readme.txt")));
        assert!(!is_asset_file(Path::new("/models/noext")));
    }

    #[test]
    fn discovered_asset_takes_filename_from_path() {
        let asset = ModelAsset::discovered(1, PathBuf::from("/models/fox.safetensors"));
        assert_eq!(asset.filename, "fox.safetensors");
        assert!(asset.content_hash.is_none());
        assert!(asset.hash_error.is_none());
    }

    #[tokio::test]
    async fn unknown_server_is_an_inventory_error() {
        let inventory = DirInventory::new();
        let result = inventory.list_assets(9).await;
        assert_matches!(result, Err(InventoryError::UnknownServer(9)));
    }

    #[tokio::test]
    async fn missing_directory_is_unavailable() {
        let inventory = DirInventory::new().with_root(1, "/does/not/exist");
        let result = inventory.list_assets(1).await;
        assert_matches!(result, Err(InventoryError::Unavailable(_)));
    }

    #[tokio::test]
    async fn scan_finds_only_asset_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.safetensors", "a.ckpt", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let inventory = DirInventory::new().with_root(1, dir.path());
        let assets = inventory.list_assets(1).await.unwrap();
        let names: Vec<&str> = assets.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, vec!["a.ckpt", "b.safetensors"]);
    }
}
