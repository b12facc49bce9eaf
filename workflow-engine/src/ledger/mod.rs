//! Checkpoint ledger: durable job records, memoized step results and leases.
//!
//! Every write is a keyed upsert, so repeating one after a failure is safe.

pub mod file_store;
pub mod memory_store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::WorkflowError;

pub use file_store::FileCheckpointStore;
pub use memory_store::InMemoryCheckpointStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

/// Ledger view of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub kind: String,
    pub lock_key: String,
    /// Last step entered, or `queued` / `completed`.
    pub stage: String,
    pub status: JobStatus,
    /// Number of executions started so far.
    pub run: u32,
    /// Serialized job, enough to rebuild and resume it.
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(job_id: &str, kind: &str, lock_key: &str, input: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.to_string(),
            kind: kind.to_string(),
            lock_key: lock_key.to_string(),
            stage: "queued".to_string(),
            status: JobStatus::Pending,
            run: 0,
            input,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    Succeeded,
    Failed,
}

/// Memoized outcome of one named step of one job.
///
/// Once `Succeeded`, the payload is never replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub job_id: String,
    pub step: String,
    pub status: StepStatus,
    pub payload: Option<serde_json::Value>,
    /// Attempts across all executions of the job.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(job_id: &str, step: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            step: step.to_string(),
            status: StepStatus::NotStarted,
            payload: None,
            attempts: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Time-bounded exclusive claim on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLease {
    pub job_id: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

impl JobLease {
    pub fn new(job_id: &str, owner: &str, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            job_id: job_id.to_string(),
            owner: owner.to_string(),
            expires_at: Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load_job(&self, job_id: &str) -> Result<Option<JobRecord>, WorkflowError>;

    async fn save_job(&self, record: &JobRecord) -> Result<(), WorkflowError>;

    /// Jobs of `kind` still `Pending`, i.e. interrupted mid-run.
    async fn list_unfinished(&self, kind: &str) -> Result<Vec<JobRecord>, WorkflowError>;

    async fn load_step(&self, job_id: &str, step: &str)
    -> Result<Option<StepRecord>, WorkflowError>;

    async fn save_step(&self, record: &StepRecord) -> Result<(), WorkflowError>;

    /// Atomically claims the job for `owner`.
    ///
    /// Returns `false` when another owner holds an unexpired lease. The same
    /// owner may re-claim, which extends the lease.
    async fn try_claim(
        &self,
        job_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, WorkflowError>;

    /// Drops the lease if `owner` holds it.
    async fn release(&self, job_id: &str, owner: &str) -> Result<(), WorkflowError>;

    /// Current lease on the job, expired or not.
    async fn load_lease(&self, job_id: &str) -> Result<Option<JobLease>, WorkflowError>;
}
