//! Job definition and the per-execution step runner.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::{Retryable, WorkflowError};
use crate::ledger::{CheckpointStore, JobRecord, StepRecord, StepStatus};
use crate::retry::RetryPolicy;

/// Writes of a succeeded step before the step is reported unrecorded.
const SAVE_ATTEMPTS: u32 = 5;

/// Scheduling class. Only `Review` jobs count against the concurrency ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobClass {
    Review,
    Indexing,
}

/// A unit of durable work driven by [`crate::WorkflowEngine`].
#[async_trait]
pub trait Job: Send + Sync + 'static {
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type Error: Retryable + From<WorkflowError> + Display + Send + Sync + 'static;

    /// Stable identity; memoized steps are keyed by it.
    fn id(&self) -> String;

    /// Submissions sharing a lock key coalesce into one execution.
    fn lock_key(&self) -> String {
        self.id()
    }

    fn kind(&self) -> &'static str;

    fn class(&self) -> JobClass;

    /// Serialized form stored in the ledger for resumption.
    fn input(&self) -> serde_json::Value;

    async fn run(&self, run: &JobRun) -> Result<Self::Output, Self::Error>;

    /// Best-effort compensation after the job has been marked failed.
    async fn on_failure(&self, _run: &JobRun, _error: &Self::Error) {}
}

/// Handle given to [`Job::run`] for executing memoized steps.
pub struct JobRun {
    job_id: String,
    store: Arc<dyn CheckpointStore>,
    policy: RetryPolicy,
    cancel: CancellationToken,
    record: Mutex<JobRecord>,
}

impl JobRun {
    pub(crate) fn new(
        store: Arc<dyn CheckpointStore>,
        policy: RetryPolicy,
        cancel: CancellationToken,
        record: JobRecord,
    ) -> Self {
        Self {
            job_id: record.job_id.clone(),
            store,
            policy,
            cancel,
            record: Mutex::new(record),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) async fn into_record(self) -> JobRecord {
        self.record.into_inner()
    }

    pub(crate) async fn record_snapshot(&self) -> JobRecord {
        self.record.lock().await.clone()
    }

    /// Runs `f` as step `name` under the engine's default retry policy.
    pub async fn step<T, E, F, Fut>(&self, name: &str, f: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: Retryable + From<WorkflowError> + Display + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        let policy = self.policy.clone();
        self.step_with(name, &policy, f).await
    }

    /// Runs `f` as step `name` unless it already succeeded in an earlier
    /// execution, in which case the recorded payload is returned.
    ///
    /// Retryable failures are retried with backoff until `policy` is spent.
    /// Every failed attempt is recorded before the next one starts.
    pub async fn step_with<T, E, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        mut f: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send,
        E: Retryable + From<WorkflowError> + Display + Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
    {
        if self.cancel.is_cancelled() {
            return Err(WorkflowError::Abandoned {
                job_id: self.job_id.clone(),
            }
            .into());
        }

        let existing = self.store.load_step(&self.job_id, name).await?;
        if let Some(rec) = &existing {
            if rec.status == StepStatus::Succeeded {
                debug!(job_id = %self.job_id, step = name, "step memoized, skipping");
                return decode_payload(name, rec.payload.clone()).map_err(E::from);
            }
        }

        self.enter_stage(name).await?;
        let mut rec = existing.unwrap_or_else(|| StepRecord::new(&self.job_id, name));
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            rec.attempts += 1;

            let result = match policy.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, f()).await {
                    Ok(r) => r,
                    Err(_) => Err(WorkflowError::StepTimeout {
                        step: name.to_string(),
                        after: limit,
                    }
                    .into()),
                },
                None => f().await,
            };

            match result {
                Ok(value) => {
                    rec.status = StepStatus::Succeeded;
                    rec.payload = Some(serde_json::to_value(&value).map_err(WorkflowError::from)?);
                    rec.last_error = None;
                    self.record_success(&rec).await?;
                    info!(job_id = %self.job_id, step = name, attempt, "step succeeded");
                    return Ok(value);
                }
                Err(e) => {
                    rec.status = StepStatus::Failed;
                    rec.last_error = Some(e.to_string());
                    if let Err(pe) = self.store.save_step(&rec).await {
                        warn!(job_id = %self.job_id, step = name, error = %pe, "could not record failed attempt");
                    }

                    let retry = e.is_retryable() && attempt < max_attempts;
                    if !retry {
                        warn!(job_id = %self.job_id, step = name, attempt, error = %e, "step failed");
                        return Err(e);
                    }

                    let delay = policy.backoff(attempt);
                    warn!(
                        job_id = %self.job_id,
                        step = name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "retrying step after error"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return Err(e),
                    }
                }
            }
        }
    }

    /// Persists a succeeded step, retrying the write. The step itself is
    /// never re-run here: its side effect already happened.
    async fn record_success(&self, rec: &StepRecord) -> Result<(), WorkflowError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.store.save_step(rec).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SAVE_ATTEMPTS => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        job_id = %self.job_id,
                        step = %rec.step,
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "could not record step success, retrying write"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(job_id = %self.job_id, step = %rec.step, error = %e, "step succeeded but was not recorded");
                    return Err(WorkflowError::Unrecorded {
                        step: rec.step.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Payload of step `name` if it has succeeded, without running anything.
    pub async fn memoized<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        match self.store.load_step(&self.job_id, name).await {
            Ok(Some(rec)) if rec.status == StepStatus::Succeeded => {
                decode_payload(name, rec.payload).ok()
            }
            _ => None,
        }
    }

    async fn enter_stage(&self, name: &str) -> Result<(), WorkflowError> {
        let mut record = self.record.lock().await;
        record.stage = name.to_string();
        self.store.save_job(&record).await
    }
}

fn decode_payload<T: DeserializeOwned>(
    step: &str,
    payload: Option<serde_json::Value>,
) -> Result<T, WorkflowError> {
    serde_json::from_value(payload.unwrap_or(serde_json::Value::Null)).map_err(|e| {
        WorkflowError::Payload {
            step: step.to_string(),
            reason: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::ledger::{InMemoryCheckpointStore, JobLease};

    /// Fails the first `failures` writes of a succeeded step.
    struct FlakyStore {
        inner: InMemoryCheckpointStore,
        failures: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryCheckpointStore::new(),
                failures: AtomicU32::new(failures),
            })
        }
    }

    #[async_trait]
    impl CheckpointStore for FlakyStore {
        async fn load_job(&self, job_id: &str) -> Result<Option<JobRecord>, WorkflowError> {
            self.inner.load_job(job_id).await
        }

        async fn save_job(&self, record: &JobRecord) -> Result<(), WorkflowError> {
            self.inner.save_job(record).await
        }

        async fn list_unfinished(&self, kind: &str) -> Result<Vec<JobRecord>, WorkflowError> {
            self.inner.list_unfinished(kind).await
        }

        async fn load_step(
            &self,
            job_id: &str,
            step: &str,
        ) -> Result<Option<StepRecord>, WorkflowError> {
            self.inner.load_step(job_id, step).await
        }

        async fn save_step(&self, record: &StepRecord) -> Result<(), WorkflowError> {
            if record.status == StepStatus::Succeeded {
                let left = self.failures.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures.store(left - 1, Ordering::SeqCst);
                    return Err(WorkflowError::Persistence("disk full".into()));
                }
            }
            self.inner.save_step(record).await
        }

        async fn try_claim(
            &self,
            job_id: &str,
            owner: &str,
            ttl: Duration,
        ) -> Result<bool, WorkflowError> {
            self.inner.try_claim(job_id, owner, ttl).await
        }

        async fn release(&self, job_id: &str, owner: &str) -> Result<(), WorkflowError> {
            self.inner.release(job_id, owner).await
        }

        async fn load_lease(&self, job_id: &str) -> Result<Option<JobLease>, WorkflowError> {
            self.inner.load_lease(job_id).await
        }
    }

    fn run_on(store: Arc<FlakyStore>) -> JobRun {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..RetryPolicy::default()
        };
        let record = JobRecord::new("job-1", "test", "job-1", serde_json::json!({}));
        JobRun::new(store, policy, CancellationToken::new(), record)
    }

    #[tokio::test]
    async fn success_write_is_retried_without_rerunning_the_step() {
        let store = FlakyStore::new(2);
        let run = run_on(store.clone());
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let out: Result<String, WorkflowError> = run
            .step("post", || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Ok("posted".to_string())
            })
            .await;

        assert_eq!(out.unwrap(), "posted");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let rec = store.load_step("job-1", "post").await.unwrap().unwrap();
        assert_eq!(rec.status, StepStatus::Succeeded);
        assert_eq!(rec.payload, Some(serde_json::json!("posted")));
    }

    #[tokio::test]
    async fn unwritable_success_is_reported_and_not_retried() {
        let store = FlakyStore::new(u32::MAX);
        let run = run_on(store.clone());
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;

        let out: Result<String, WorkflowError> = run
            .step("post", || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Ok("posted".to_string())
            })
            .await;

        match out {
            Err(WorkflowError::Unrecorded { step, .. }) => assert_eq!(step, "post"),
            other => panic!("expected unrecorded step, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!WorkflowError::Unrecorded { step: "post".into(), reason: "x".into() }.is_retryable());
    }
}
