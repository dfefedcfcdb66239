//! Wire models for the metadata registry's by-hash lookup endpoint.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Domain metadata
// ---------------------------------------------------------------------------

/// Metadata for one model asset, as cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    /// Version name reported by the registry.
    pub name: String,
    /// Parent model name, when the registry reports one.
    pub model_name: Option<String>,
    /// Free-text description from the registry, when present.
    pub description: Option<String>,
    /// Base model family the asset was trained against (e.g. "SDXL 1.0").
    pub base_model: Option<String>,
    /// Trigger words the asset was trained with.
    pub trained_words: Vec<String>,
    /// Preview image URLs.
    pub preview_images: Vec<String>,
    pub nsfw: bool,
    /// Registry page for the asset, when derivable.
    pub source_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Registry response shapes
// ---------------------------------------------------------------------------

/// Response body of `GET /v1/model-versions/by-hash/{hash}`.
#[derive(Debug, Deserialize)]
pub struct VersionResponse {
    pub id: Option<i64>,
    #[serde(rename = "modelId")]
    pub model_id: Option<i64>,
    pub name: String,
    #[serde(rename = "baseModel")]
    pub base_model: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "trainedWords", default)]
    pub trained_words: Vec<String>,
    #[serde(default)]
    pub images: Vec<VersionImage>,
    pub model: Option<VersionModel>,
}

/// One preview image entry in a version response.
#[derive(Debug, Deserialize)]
pub struct VersionImage {
    pub url: String,
}

/// Parent-model summary embedded in a version response.
#[derive(Debug, Deserialize)]
pub struct VersionModel {
    pub name: String,
    #[serde(default)]
    pub nsfw: bool,
}

impl VersionResponse {
    /// Flatten the registry response into cacheable [`AssetMetadata`].
    pub fn into_metadata(self, registry_base: &str) -> AssetMetadata {
        let source_url = match (self.model_id, self.id) {
            (Some(model_id), Some(version_id)) => Some(format!(
                "{registry_base}/models/{model_id}?modelVersionId={version_id}"
            )),
            (Some(model_id), None) => Some(format!("{registry_base}/models/{model_id}")),
            _ => None,
        };

        AssetMetadata {
            name: self.name,
            model_name: self.model.as_ref().map(|m| m.name.clone()),
            description: self.description,
            base_model: self.base_model,
            trained_words: self.trained_words,
            preview_images: self.images.into_iter().map(|i| i.url).collect(),
            nsfw: self.model.map(|m| m.nsfw).unwrap_or(false),
            source_url,
        }
    }
}
