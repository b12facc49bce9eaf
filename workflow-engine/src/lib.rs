//! Durable, checkpointed job execution.
//!
//! A [`Job`] is a sequence of named steps run through [`JobRun::step`]. Each
//! successful step is recorded in a [`CheckpointStore`], so a job that is
//! resubmitted after a crash or failure resumes at the first unfinished step.

pub mod engine;
pub mod errors;
pub mod job;
pub mod ledger;
pub mod retry;

pub use engine::{EngineConfig, JobHandle, JobOutcome, WorkflowEngine};
pub use errors::{Retryable, WorkflowError};
pub use job::{Job, JobClass, JobRun};
pub use ledger::{
    CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore, JobRecord, JobStatus,
    StepRecord, StepStatus,
};
pub use retry::RetryPolicy;
