//! Asset fingerprinting: stable content-derived hashes for model files.
//!
//! Hashing is CPU/IO-bound and independent per asset, so a batch runs
//! through a bounded worker pool. A hash failure is recorded on the asset
//! and never aborts the batch: a sync with partial hashing failures still
//! completes with a partial result set.

use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncReadExt;

use atelier_core::hashing::StreamingHasher;

use crate::inventory::ModelAsset;

/// Read size for chunked hashing. Model files run to gigabytes, so the
/// file is never buffered whole.
pub const HASH_CHUNK_SIZE: usize = 1024 * 1024;

/// Per-asset hashing failure. Recorded on the asset record, non-fatal to
/// the sync session.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Hashing failed: {0}")]
pub struct HashError(pub String);

/// Compute the SHA-256 content fingerprint of a file.
pub async fn fingerprint_file(path: &Path) -> Result<String, HashError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| HashError(format!("{}: {e}", path.display())))?;

    let mut hasher = StreamingHasher::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| HashError(format!("{}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

/// Fingerprint a batch of assets with bounded parallelism.
///
/// Each asset comes back with either `content_hash` or `hash_error` set.
/// `on_complete(done, total)` fires after every finished asset, in
/// completion order; the returned batch is re-sorted by filename so
/// downstream processing stays deterministic.
pub async fn fingerprint_assets<F>(
    assets: Vec<ModelAsset>,
    concurrency: usize,
    mut on_complete: F,
) -> Vec<ModelAsset>
where
    F: FnMut(usize, usize),
{
    let total = assets.len();
    let mut stream = futures::stream::iter(assets.into_iter().map(|mut asset| async move {
        match fingerprint_file(&asset.path).await {
            Ok(hash) => asset.content_hash = Some(hash),
            Err(e) => {
                tracing::warn!(
                    server_id = asset.server_id,
                    filename = %asset.filename,
                    error = %e,
                    "Asset hashing failed",
                );
                asset.hash_error = Some(e.to_string());
            }
        }
        asset
    }))
    .buffer_unordered(concurrency.max(1));

    let mut done = 0;
    let mut out = Vec::with_capacity(total);
    while let Some(asset) = stream.next().await {
        done += 1;
        on_complete(done, total);
        out.push(asset);
    }

    out.sort_by(|a, b| a.filename.cmp(&b.filename));
    out
}
