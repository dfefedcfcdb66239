//! Pure domain logic for workboard-driven generation.
//!
//! Everything in this crate is synchronous and side-effect-free: resolving
//! submitted field values against a workboard's declared fields, allocating
//! seeds, binding a workflow template, and assembling the final job payload.
//! The only async surface is the [`assembly::JobQueue`] trait, the seam
//! through which an assembled job is handed to the external executor.

pub mod assembly;
pub mod error;
pub mod fields;
pub mod hashing;
pub mod seed;
pub mod template;
pub mod types;
pub mod workboard;
