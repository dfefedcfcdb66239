//! Job assembly: resolving a submission against a workboard and producing
//! the final execution payload.
//!
//! [`assemble`] runs the field resolver over every declared field, collecting
//! all errors instead of failing fast, allocates the seed, then binds the
//! workflow template. The resulting [`GenerationJob`] is immutable; only the
//! external executor moves it through its status lifecycle. Hand-off to the
//! queue happens through the [`JobQueue`] seam, exactly once per job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fields::{resolve_field, FieldResolutionError, ResolvedField};
use crate::seed::{self, SeedRequest};
use crate::template::{self, BoundDocument};
use crate::types::Timestamp;
use crate::workboard::WorkboardDefinition;

// ---------------------------------------------------------------------------
// Job model
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation job. Terminal on
/// `Completed`/`Failed`/`Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// A fully assembled generation job.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationJob {
    pub id: uuid::Uuid,
    pub workboard_id: uuid::Uuid,
    pub workboard_version: u32,
    pub resolved_fields: Vec<ResolvedField>,
    pub seed: u64,
    /// The workflow template after substitution.
    pub bound_document: serde_json::Value,
    pub status: JobStatus,
    /// Non-fatal warnings gathered during resolution and binding.
    pub warnings: Vec<String>,
    pub created_at: Timestamp,
}

impl GenerationJob {
    /// The wire payload handed to the external executor queue.
    pub fn payload(&self) -> JobPayload {
        JobPayload {
            job_id: self.id,
            workboard_id: self.workboard_id,
            bound_document: self.bound_document.clone(),
            seed: self.seed,
            created_at: self.created_at,
        }
    }
}

/// Wire shape accepted by the external job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub job_id: uuid::Uuid,
    pub workboard_id: uuid::Uuid,
    pub bound_document: serde_json::Value,
    pub seed: u64,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Aggregate of per-field failures. Blocks job creation entirely; the
/// executor is never contacted when this is returned.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("Assembly failed with {} field error(s)", field_errors.len())]
pub struct AssemblyError {
    pub field_errors: Vec<FieldResolutionError>,
}

/// Failure reported by the external queue collaborator.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue refused the payload.
    #[error("Queue rejected job: {0}")]
    Rejected(String),

    /// The queue could not be reached.
    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

/// Failure from [`JobAssembler::submit`].
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

// ---------------------------------------------------------------------------
// External queue seam
// ---------------------------------------------------------------------------

/// The external job queue collaborator.
///
/// Obligation: accept a payload exactly once and report terminal status
/// through its own channels. Retry/backoff is the queue's concern.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, payload: JobPayload) -> Result<(), QueueError>;
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Resolve a raw submission into a [`GenerationJob`].
///
/// Every declared field is resolved even after the first failure so the
/// submitter sees all invalid fields at once. Seed validation failures are
/// reported in the same list under the pseudo-field `seed`.
pub fn assemble(
    board: &WorkboardDefinition,
    raw_inputs: &serde_json::Map<String, serde_json::Value>,
    seed_request: SeedRequest,
) -> Result<GenerationJob, AssemblyError> {
    let mut field_errors = Vec::new();
    let mut resolved = Vec::new();
    let mut warnings = Vec::new();

    for def in &board.fields {
        match resolve_field(def, raw_inputs.get(&def.name)) {
            Ok(Some(r)) => {
                if let Some(w) = &r.warning {
                    warnings.push(format!("{}: {w}", r.name));
                }
                resolved.push(r);
            }
            Ok(None) => {}
            Err(e) => field_errors.push(e),
        }
    }

    let seed = match seed::allocate(seed_request) {
        Ok(seed) => seed,
        Err(e) => {
            field_errors.push(FieldResolutionError {
                field: "seed".to_string(),
                reason: e.to_string(),
            });
            return Err(AssemblyError { field_errors });
        }
    };

    if !field_errors.is_empty() {
        return Err(AssemblyError { field_errors });
    }

    let BoundDocument { document, warnings: bind_warnings } =
        template::bind(&board.workflow_template, &board.fields, &resolved, seed);

    // An unresolved placeholder is normally a warning, but one naming a
    // declared required field means a required slot stayed unbound.
    let mut blocking = Vec::new();
    for warning in &bind_warnings {
        let template::BindWarning::UnresolvedPlaceholder { name } = warning;
        match board.field(name) {
            Some(def) if def.required => blocking.push(FieldResolutionError {
                field: name.clone(),
                reason: "required placeholder remained unresolved".to_string(),
            }),
            _ => warnings.push(format!("unresolved placeholder: {name}")),
        }
    }
    if !blocking.is_empty() {
        return Err(AssemblyError {
            field_errors: blocking,
        });
    }

    Ok(GenerationJob {
        id: uuid::Uuid::now_v7(),
        workboard_id: board.id,
        workboard_version: board.version,
        resolved_fields: resolved,
        seed,
        bound_document: document,
        status: JobStatus::Pending,
        warnings,
        created_at: chrono::Utc::now(),
    })
}

/// Orchestrates assembly and the single hand-off to the external queue.
pub struct JobAssembler<Q: JobQueue> {
    queue: Q,
}

impl<Q: JobQueue> JobAssembler<Q> {
    pub fn new(queue: Q) -> Self {
        Self { queue }
    }

    /// Assemble a job and hand it to the queue.
    ///
    /// On any required-field error the queue is never contacted.
    pub async fn submit(
        &self,
        board: &WorkboardDefinition,
        raw_inputs: &serde_json::Map<String, serde_json::Value>,
        seed_request: SeedRequest,
    ) -> Result<GenerationJob, SubmitError> {
        let job = assemble(board, raw_inputs, seed_request)?;
        self.queue.enqueue(job.payload()).await?;
        Ok(job)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
