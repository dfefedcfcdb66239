//! Seed allocation for reproducible generation.
//!
//! Seeds carry 64-bit unsigned semantics. An explicit seed outside
//! `[0, 2^64 - 1]` is a validation error, never silently masked: a job whose
//! recorded seed differs from the value the backend actually ran with could
//! not be reproduced afterwards.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Largest valid seed value (`2^64 - 1`).
pub const SEED_MAX: u128 = u64::MAX as u128;

/// How the submitter wants the seed chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedRequest {
    /// Draw a uniformly random seed in `[0, 2^64 - 1]`.
    Random,
    /// Use exactly this value. Carried as `u128` so out-of-range inputs
    /// survive long enough to be rejected instead of wrapping.
    Explicit(u128),
}

/// Allocate the seed for a job.
pub fn allocate(request: SeedRequest) -> Result<u64, CoreError> {
    match request {
        SeedRequest::Random => Ok(rand::rng().random::<u64>()),
        SeedRequest::Explicit(value) => {
            if value > SEED_MAX {
                return Err(CoreError::Validation(format!(
                    "Seed {value} is out of range: must be at most {SEED_MAX}"
                )));
            }
            Ok(value as u64)
        }
    }
}
