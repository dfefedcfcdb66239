//! Rate-limited HTTP client for the external model-metadata registry.
//!
//! Single responsibility: look up metadata for a content fingerprint.
//! All requests flow through a [`limiter::RequestPacer`] enforcing a hard
//! minimum inter-request interval per registry, regardless of how many
//! sync tasks are running elsewhere.

pub mod client;
pub mod limiter;
pub mod models;

pub use client::{RegistryClient, RegistryError, RegistryLookup};
pub use models::AssetMetadata;
