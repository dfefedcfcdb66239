//! Asynchronous metadata synchronization for local model assets.
//!
//! One background task per backend server inventories the server's model
//! assets, fingerprints them, queries the external registry under a hard
//! rate limit, and maintains a queryable metadata cache. Single-flight per
//! server is enforced by [`session::SessionRegistry`]; progress is
//! published for polling and is monotonic within a session.

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod inventory;
pub mod orchestrator;
pub mod session;

pub use cache::MetadataCacheStore;
pub use orchestrator::SyncOrchestrator;
pub use session::{SyncSession, SyncStatus};
