use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::errors::WorkflowError;
use crate::ledger::{CheckpointStore, JobLease, JobRecord, JobStatus, StepRecord};

/// Ledger kept in process memory. Lost on restart.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
    steps: Mutex<HashMap<(String, String), StepRecord>>,
    leases: Mutex<HashMap<String, JobLease>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load_job(&self, job_id: &str) -> Result<Option<JobRecord>, WorkflowError> {
        Ok(self.jobs.lock().await.get(job_id).cloned())
    }

    async fn save_job(&self, record: &JobRecord) -> Result<(), WorkflowError> {
        let mut record = record.clone();
        record.updated_at = Utc::now();
        self.jobs.lock().await.insert(record.job_id.clone(), record);
        Ok(())
    }

    async fn list_unfinished(&self, kind: &str) -> Result<Vec<JobRecord>, WorkflowError> {
        let mut out: Vec<JobRecord> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|r| r.kind == kind && r.status == JobStatus::Pending)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn load_step(
        &self,
        job_id: &str,
        step: &str,
    ) -> Result<Option<StepRecord>, WorkflowError> {
        let key = (job_id.to_string(), step.to_string());
        Ok(self.steps.lock().await.get(&key).cloned())
    }

    async fn save_step(&self, record: &StepRecord) -> Result<(), WorkflowError> {
        let key = (record.job_id.clone(), record.step.clone());
        let mut record = record.clone();
        record.updated_at = Utc::now();
        self.steps.lock().await.insert(key, record);
        Ok(())
    }

    async fn try_claim(
        &self,
        job_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, WorkflowError> {
        let mut leases = self.leases.lock().await;
        if let Some(held) = leases.get(job_id) {
            if held.owner != owner && !held.is_expired() {
                return Ok(false);
            }
        }
        leases.insert(job_id.to_string(), JobLease::new(job_id, owner, ttl));
        Ok(true)
    }

    async fn release(&self, job_id: &str, owner: &str) -> Result<(), WorkflowError> {
        let mut leases = self.leases.lock().await;
        if leases.get(job_id).is_some_and(|l| l.owner == owner) {
            leases.remove(job_id);
        }
        Ok(())
    }

    async fn load_lease(&self, job_id: &str) -> Result<Option<JobLease>, WorkflowError> {
        Ok(self.leases.lock().await.get(job_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lease_blocks_other_owners_until_released() {
        let store = InMemoryCheckpointStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.try_claim("job", "a", ttl).await.unwrap());
        assert!(!store.try_claim("job", "b", ttl).await.unwrap());
        assert!(store.try_claim("job", "a", ttl).await.unwrap());

        store.release("job", "b").await.unwrap();
        assert!(!store.try_claim("job", "b", ttl).await.unwrap());

        store.release("job", "a").await.unwrap();
        assert!(store.try_claim("job", "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_can_be_taken_over() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.try_claim("job", "a", Duration::ZERO).await.unwrap());
        assert!(store.try_claim("job", "b", Duration::from_secs(60)).await.unwrap());
    }
}
