//! Per-server sync sessions: single-flight gating and observable progress.
//!
//! At most one sync runs per server at a time. [`SessionRegistry::begin`]
//! either claims the slot and hands back a [`SessionGuard`], or returns a
//! snapshot of the session already in flight. The guard is RAII: a task
//! that panics or is aborted without finalizing leaves the session marked
//! failed rather than wedged in `Fetching`, so the next trigger can run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use atelier_core::types::{ServerId, Timestamp};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Progress stage while assets are being fingerprinted.
pub const STAGE_HASHING: &str = "hashing";

/// Progress stage while registry metadata is being fetched.
pub const STAGE_FETCHING_METADATA: &str = "fetching_metadata";

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Lifecycle of one server's sync slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Fetching,
    Completed,
    Failed,
}

/// Progress within the current stage. `current` is monotonic within a
/// session; it resets when a new stage begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub stage: String,
    pub current: usize,
    pub total: usize,
}

/// Observable state of a server's sync slot.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSession {
    pub status: SyncStatus,
    pub progress: Option<SyncProgress>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub error_message: Option<String>,
    /// Per-asset registry failures seen during the last run. They do not
    /// fail the session; the count surfaces degraded registry health.
    pub registry_failures: usize,
}

impl SyncSession {
    fn idle() -> Self {
        Self {
            status: SyncStatus::Idle,
            progress: None,
            started_at: None,
            finished_at: None,
            error_message: None,
            registry_failures: 0,
        }
    }

    fn start(&mut self) {
        self.status = SyncStatus::Fetching;
        self.progress = None;
        self.started_at = Some(chrono::Utc::now());
        self.finished_at = None;
        self.error_message = None;
        self.registry_failures = 0;
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Tracks every server's sync session. Shared between the orchestrator
/// and status queries.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ServerId, SyncSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Claim a server's sync slot.
    ///
    /// Returns a guard on success. If a sync is already in flight for the
    /// server, returns a snapshot of that session instead; completed and
    /// failed sessions do not block a new claim.
    pub fn begin(self: &Arc<Self>, server_id: ServerId) -> Result<SessionGuard, SyncSession> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.entry(server_id).or_insert_with(SyncSession::idle);
        if session.status == SyncStatus::Fetching {
            return Err(session.clone());
        }
        session.start();
        Ok(SessionGuard {
            registry: Arc::clone(self),
            server_id,
            finalized: false,
        })
    }

    /// Current session state for a server. A never-synced server reads
    /// as idle.
    pub fn snapshot(&self, server_id: ServerId) -> SyncSession {
        self.sessions
            .lock()
            .unwrap()
            .get(&server_id)
            .cloned()
            .unwrap_or_else(SyncSession::idle)
    }

    fn with_session(&self, server_id: ServerId, f: impl FnOnce(&mut SyncSession)) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(&server_id) {
            f(session);
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Exclusive handle on a server's in-flight session.
///
/// Dropping the guard without calling [`SessionGuard::complete`] or
/// [`SessionGuard::fail`] marks the session failed.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    server_id: ServerId,
    finalized: bool,
}

impl SessionGuard {
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// Publish progress for the current stage.
    pub fn update_progress(&self, stage: &str, current: usize, total: usize) {
        self.registry.with_session(self.server_id, |session| {
            session.progress = Some(SyncProgress {
                stage: stage.to_string(),
                current,
                total,
            });
        });
    }

    /// Count a per-asset registry failure without failing the session.
    pub fn record_registry_failure(&self) {
        self.registry.with_session(self.server_id, |session| {
            session.registry_failures += 1;
        });
    }

    /// Finalize the session as completed.
    pub fn complete(mut self) {
        self.finalized = true;
        self.registry.with_session(self.server_id, |session| {
            session.status = SyncStatus::Completed;
            session.finished_at = Some(chrono::Utc::now());
        });
    }

    /// Finalize the session as failed.
    pub fn fail(mut self, message: impl Into<String>) {
        self.finalized = true;
        let message = message.into();
        self.registry.with_session(self.server_id, |session| {
            session.status = SyncStatus::Failed;
            session.finished_at = Some(chrono::Utc::now());
            session.error_message = Some(message);
        });
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        self.registry.with_session(self.server_id, |session| {
            session.status = SyncStatus::Failed;
            session.finished_at = Some(chrono::Utc::now());
            session.error_message = Some("Sync task aborted before finishing".to_string());
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
