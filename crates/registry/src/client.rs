//! REST client for the model-metadata registry.
//!
//! Wraps the registry's by-hash lookup endpoint using [`reqwest`]. Every
//! request passes through the [`RequestPacer`] first; a 404 is a valid,
//! cacheable "not found" result rather than an error.

use crate::limiter::{interval_for_credential, RequestPacer};
use crate::models::{AssetMetadata, VersionResponse};

/// Rate-limited HTTP client for a single metadata registry.
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    pacer: RequestPacer,
}

/// Outcome of a fingerprint lookup.
///
/// `NotFound` is a first-class result so callers can negative-cache it.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryLookup {
    Found(AssetMetadata),
    NotFound,
}

/// Errors from the registry REST layer.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("Registry request failed: {0}")]
    Request(String),

    /// The registry returned a non-2xx status (other than 404).
    #[error("Registry error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Registry response decode failed: {0}")]
    Decode(String),
}

impl RegistryError {
    /// Whether a retry on a later pass could plausibly succeed.
    ///
    /// Transient failures skip the asset for the current sync pass and
    /// leave any previous cache entry in place.
    pub fn is_transient(&self) -> bool {
        match self {
            RegistryError::Request(_) => true,
            RegistryError::Api { status, .. } => *status >= 500 || *status == 429,
            RegistryError::Decode(_) => false,
        }
    }
}

impl RegistryClient {
    /// Create a client for a registry.
    ///
    /// * `base_url` - registry base, e.g. `https://civitai.com/api`.
    /// * `api_token` - optional operator credential; its presence lowers
    ///   the pacing interval from 1000 ms to 200 ms.
    pub fn new(base_url: String, api_token: Option<String>) -> Self {
        let pacer = RequestPacer::new(interval_for_credential(api_token.is_some()));
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_token,
            pacer,
        }
    }

    /// The pacing interval requests are gated by.
    pub fn min_interval(&self) -> std::time::Duration {
        self.pacer.min_interval()
    }

    /// Fetch metadata for a content fingerprint.
    ///
    /// Sends `GET /v1/model-versions/by-hash/{hash}` after acquiring a
    /// pacer slot. A 404 maps to [`RegistryLookup::NotFound`].
    pub async fn fetch_metadata(&self, hash: &str) -> Result<RegistryLookup, RegistryError> {
        self.pacer.acquire().await;

        let url = format!("{}/v1/model-versions/by-hash/{hash}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RegistryError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(hash, "Registry reports fingerprint not found");
            return Ok(RegistryLookup::NotFound);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RegistryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let version: VersionResponse = response
            .json()
            .await
            .map_err(|e| RegistryError::Decode(e.to_string()))?;

        Ok(RegistryLookup::Found(
            version.into_metadata(self.site_base()),
        ))
    }

    /// Base URL of the registry's browsable site, for source links.
    ///
    /// Strips a trailing `/api` segment from the API base when present.
    fn site_base(&self) -> &str {
        self.base_url
            .strip_suffix("/api")
            .unwrap_or(&self.base_url)
    }
}
