//! Engine-level errors and the retry classification shared with job errors.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the engine itself rather than by job code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Checkpoint ledger could not be read or written.
    #[error("checkpoint ledger error: {0}")]
    Persistence(String),

    /// A memoized payload did not match the step's output type.
    #[error("step '{step}' payload could not be decoded: {reason}")]
    Payload { step: String, reason: String },

    /// One attempt of a step exceeded its per-attempt timeout.
    #[error("step '{step}' timed out after {after:?}")]
    StepTimeout { step: String, after: Duration },

    /// The job deadline elapsed; no further steps start.
    #[error("job {job_id} abandoned after exceeding its deadline")]
    Abandoned { job_id: String },

    /// Another live owner holds the job's lease.
    #[error("job {job_id} is already in flight")]
    LeaseHeld { job_id: String },

    /// The step's side effect happened but its success could not be written.
    /// Retrying the step would repeat the side effect.
    #[error("step '{step}' succeeded but its checkpoint could not be saved: {reason}")]
    Unrecorded { step: String, reason: String },

    /// The execution task ended without reporting an outcome.
    #[error("job {job_id} ended without an outcome")]
    Lost { job_id: String },
}

impl From<std::io::Error> for WorkflowError {
    fn from(e: std::io::Error) -> Self {
        WorkflowError::Persistence(e.to_string())
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(e: serde_json::Error) -> Self {
        WorkflowError::Persistence(e.to_string())
    }
}

/// Whether repeating the failed operation may succeed.
///
/// Job error types implement this so the step runner knows when to retry.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for WorkflowError {
    fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::StepTimeout { .. })
    }
}
