//! Durable job engine: bounded concurrency, per-key coalescing, ledger
//! leases, deadlines and compensation.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::errors::WorkflowError;
use crate::job::{Job, JobClass, JobRun};
use crate::ledger::{CheckpointStore, JobRecord, JobStatus};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Review jobs allowed to run at once.
    pub review_concurrency: usize,
    /// Wall-clock budget per execution, including time queued for a slot.
    pub job_deadline: Duration,
    /// Lease lifetime; should outlive `job_deadline`.
    pub lease_ttl: Duration,
    pub retry: RetryPolicy,
    /// Lease owner name. Stable across restarts so a restarted process can
    /// take back leases it held before.
    pub instance_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            review_concurrency: 5,
            job_deadline: Duration::from_secs(15 * 60),
            lease_ttl: Duration::from_secs(20 * 60),
            retry: RetryPolicy::default(),
            instance_id: format!("engine-{}", Uuid::new_v4()),
        }
    }
}

impl EngineConfig {
    /// Reads `REVIEW_CONCURRENCY`, `JOB_DEADLINE_SECS` and
    /// `ENGINE_INSTANCE_ID` (falling back to `HOSTNAME`) plus the retry
    /// variables; unset or malformed values fall back to the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let review_concurrency = std::env::var("REVIEW_CONCURRENCY")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(d.review_concurrency);
        let job_deadline = std::env::var("JOB_DEADLINE_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .map(Duration::from_secs)
            .unwrap_or(d.job_deadline);

        Self {
            review_concurrency,
            job_deadline,
            lease_ttl: job_deadline + Duration::from_secs(5 * 60),
            retry: RetryPolicy::from_env(),
            instance_id: instance_id_from_env().unwrap_or(d.instance_id),
        }
    }
}

fn instance_id_from_env() -> Option<String> {
    ["ENGINE_INSTANCE_ID", "HOSTNAME"].iter().find_map(|var| {
        std::env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Terminal result of one submission.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<T> {
    Completed(T),
    Failed { error: String },
}

impl<T> JobOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }
}

type OutcomeSlot = watch::Receiver<Option<JobOutcome<serde_json::Value>>>;

/// Awaitable result of [`WorkflowEngine::submit`].
pub struct JobHandle<T> {
    job_id: String,
    rx: OutcomeSlot,
    _out: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> JobHandle<T> {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Waits for the execution this submission started or joined.
    pub async fn wait(mut self) -> JobOutcome<T> {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(v) => v.clone(),
            Err(_) => None,
        };

        match outcome {
            Some(JobOutcome::Completed(v)) => match serde_json::from_value(v) {
                Ok(out) => JobOutcome::Completed(out),
                Err(e) => JobOutcome::Failed {
                    error: format!("job {} output could not be decoded: {e}", self.job_id),
                },
            },
            Some(JobOutcome::Failed { error }) => JobOutcome::Failed { error },
            None => JobOutcome::Failed {
                error: WorkflowError::Lost {
                    job_id: self.job_id.clone(),
                }
                .to_string(),
            },
        }
    }
}

struct EngineInner {
    store: Arc<dyn CheckpointStore>,
    cfg: EngineConfig,
    review_slots: Arc<Semaphore>,
    in_flight: Mutex<HashMap<String, OutcomeSlot>>,
}

/// Drives [`Job`]s to completion against a [`CheckpointStore`].
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn CheckpointStore>, cfg: EngineConfig) -> Self {
        info!(
            owner = %cfg.instance_id,
            review_concurrency = cfg.review_concurrency,
            deadline_secs = cfg.job_deadline.as_secs(),
            "workflow engine started"
        );
        Self {
            inner: Arc::new(EngineInner {
                review_slots: Arc::new(Semaphore::new(cfg.review_concurrency.max(1))),
                store,
                cfg,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> Arc<dyn CheckpointStore> {
        Arc::clone(&self.inner.store)
    }

    /// Lock keys with an execution in progress in this process.
    pub fn in_flight(&self) -> usize {
        self.inner
            .in_flight
            .lock()
            .map(|m| m.len())
            .unwrap_or_default()
    }

    /// Starts `job`, or joins the in-flight execution sharing its lock key.
    ///
    /// Returns immediately; the job runs on the Tokio runtime.
    pub fn submit<J: Job>(&self, job: J) -> JobHandle<J::Output> {
        self.spawn(job, false)
    }

    /// Like [`submit`](Self::submit), for jobs found unfinished in the ledger
    /// at boot. A lease left by another owner is waited out instead of
    /// failing the job.
    pub fn resume<J: Job>(&self, job: J) -> JobHandle<J::Output> {
        self.spawn(job, true)
    }

    fn spawn<J: Job>(&self, job: J, resume: bool) -> JobHandle<J::Output> {
        let job_id = job.id();
        let key = job.lock_key();

        let (tx, rx) = {
            let mut map = match self.inner.in_flight.lock() {
                Ok(m) => m,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(rx) = map.get(&key) {
                debug!(job_id = %job_id, lock_key = %key, "joining in-flight execution");
                return JobHandle {
                    job_id,
                    rx: rx.clone(),
                    _out: PhantomData,
                };
            }
            let (tx, rx) = watch::channel(None);
            map.insert(key.clone(), rx.clone());
            (tx, rx)
        };

        let inner = Arc::clone(&self.inner);
        let span = info_span!("job", job_id = %job_id, kind = job.kind());
        tokio::spawn(
            async move {
                if resume {
                    inner.wait_for_lease(&job.id()).await;
                }
                inner.execute(job, tx).await;
                let mut map = match inner.in_flight.lock() {
                    Ok(m) => m,
                    Err(poisoned) => poisoned.into_inner(),
                };
                map.remove(&key);
            }
            .instrument(span),
        );

        JobHandle {
            job_id,
            rx,
            _out: PhantomData,
        }
    }
}

impl EngineInner {
    fn owner(&self) -> &str {
        &self.cfg.instance_id
    }

    /// Sleeps until the job's lease is free, expired, or ours.
    async fn wait_for_lease(&self, job_id: &str) {
        loop {
            let held = match self.store.load_lease(job_id).await {
                Ok(Some(lease)) if lease.owner != self.owner() && !lease.is_expired() => lease,
                Ok(_) => return,
                Err(e) => {
                    warn!(error = %e, "could not read job lease, claiming anyway");
                    return;
                }
            };
            let wait = (held.expires_at - Utc::now())
                .to_std()
                .unwrap_or_default()
                .min(self.cfg.lease_ttl)
                + Duration::from_millis(10);
            info!(
                holder = %held.owner,
                wait_ms = wait.as_millis() as u64,
                "job leased by another owner, resuming after expiry"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Runs the job under its deadline and publishes the outcome.
    ///
    /// On deadline expiry the outcome is published as failed right away, no
    /// further step starts, and this returns only once the in-flight step has
    /// finished and been recorded. The job is then recorded failed even if
    /// that step was its last.
    async fn execute<J: Job>(
        &self,
        job: J,
        tx: watch::Sender<Option<JobOutcome<serde_json::Value>>>,
    ) {
        let cancel = CancellationToken::new();
        let drive = self.drive(&job, cancel.clone());
        tokio::pin!(drive);

        tokio::select! {
            outcome = &mut drive => {
                let _ = tx.send(Some(outcome));
            }
            _ = tokio::time::sleep(self.cfg.job_deadline) => {
                let err = WorkflowError::Abandoned { job_id: job.id() };
                warn!(error = %err, "job deadline exceeded, abandoning");
                cancel.cancel();
                let _ = tx.send(Some(JobOutcome::Failed { error: err.to_string() }));
                let _ = drive.await;
            }
        }
    }

    async fn drive<J: Job>(
        &self,
        job: &J,
        cancel: CancellationToken,
    ) -> JobOutcome<serde_json::Value> {
        let job_id = job.id();

        let existing = match self.store.load_job(&job_id).await {
            Ok(Some(rec)) if rec.status == JobStatus::Completed => {
                info!("job already completed, returning recorded output");
                return JobOutcome::Completed(rec.output.unwrap_or(serde_json::Value::Null));
            }
            Ok(rec) => rec,
            Err(e) => return failed(e),
        };

        let _permit = match job.class() {
            JobClass::Review => match Arc::clone(&self.review_slots).acquire_owned().await {
                Ok(p) => Some(p),
                Err(_) => return failed("review slots closed"),
            },
            JobClass::Indexing => None,
        };

        match self
            .store
            .try_claim(&job_id, self.owner(), self.cfg.lease_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => return failed(WorkflowError::LeaseHeld { job_id }),
            Err(e) => return failed(e),
        }

        let outcome = self.run_claimed(job, existing, cancel).await;

        if let Err(e) = self.store.release(&job_id, self.owner()).await {
            warn!(error = %e, "could not release job lease");
        }
        outcome
    }

    async fn run_claimed<J: Job>(
        &self,
        job: &J,
        existing: Option<JobRecord>,
        cancel: CancellationToken,
    ) -> JobOutcome<serde_json::Value> {
        let job_id = job.id();
        let mut record = existing.unwrap_or_else(|| {
            JobRecord::new(&job_id, job.kind(), &job.lock_key(), job.input())
        });
        record.run += 1;
        record.status = JobStatus::Pending;
        record.stage = "queued".to_string();
        record.error = None;
        if let Err(e) = self.store.save_job(&record).await {
            return failed(e);
        }
        info!(run = record.run, "job execution started");

        let run = JobRun::new(
            Arc::clone(&self.store),
            self.cfg.retry.clone(),
            cancel,
            record,
        );
        let result = match job.run(&run).await {
            Ok(_) if run.is_cancelled() => Err(J::Error::from(WorkflowError::Abandoned {
                job_id: job_id.clone(),
            })),
            other => other,
        };

        match result {
            Ok(output) => {
                let value = match serde_json::to_value(&output) {
                    Ok(v) => v,
                    Err(e) => return failed(e),
                };
                let mut record = run.into_record().await;
                record.status = JobStatus::Completed;
                record.stage = "completed".to_string();
                record.output = Some(value.clone());
                if let Err(e) = self.store.save_job(&record).await {
                    error!(error = %e, "job completed but its record could not be saved");
                }
                info!("job completed");
                JobOutcome::Completed(value)
            }
            Err(err) => {
                let message = err.to_string();
                {
                    let mut record = run.record_snapshot().await;
                    record.status = JobStatus::Failed;
                    record.error = Some(message.clone());
                    if let Err(e) = self.store.save_job(&record).await {
                        error!(error = %e, "could not mark job failed");
                    }
                }
                warn!(error = %message, "job failed, running compensation");
                job.on_failure(&run, &err).await;
                JobOutcome::Failed { error: message }
            }
        }
    }
}

fn failed<E: std::fmt::Display>(e: E) -> JobOutcome<serde_json::Value> {
    warn!(error = %e, "job could not run");
    JobOutcome::Failed {
        error: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use thiserror::Error;

    use super::*;
    use crate::errors::Retryable;
    use crate::ledger::{InMemoryCheckpointStore, StepStatus};

    #[derive(Debug, Error)]
    enum ScriptError {
        #[error("transient failure")]
        Transient,
        #[error("fatal failure")]
        Fatal,
        #[error(transparent)]
        Engine(#[from] WorkflowError),
    }

    impl Retryable for ScriptError {
        fn is_retryable(&self) -> bool {
            match self {
                ScriptError::Transient => true,
                ScriptError::Fatal => false,
                ScriptError::Engine(e) => e.is_retryable(),
            }
        }
    }

    #[derive(Default)]
    struct Script {
        calls: Mutex<HashMap<&'static str, u32>>,
        transient: Mutex<HashMap<&'static str, u32>>,
        fatal: Mutex<HashSet<&'static str>>,
        delay: Duration,
        compensations: AtomicU32,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Script {
        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                delay,
                ..Self::default()
            })
        }

        fn calls(&self, step: &str) -> u32 {
            self.calls.lock().unwrap().get(step).copied().unwrap_or(0)
        }

        fn fail_transiently(&self, step: &'static str, times: u32) {
            self.transient.lock().unwrap().insert(step, times);
        }

        fn fail_fatally(&self, step: &'static str) {
            self.fatal.lock().unwrap().insert(step);
        }

        fn heal(&self) {
            self.fatal.lock().unwrap().clear();
            self.transient.lock().unwrap().clear();
        }

        async fn attempt(&self, step: &'static str) -> Result<String, ScriptError> {
            *self.calls.lock().unwrap().entry(step).or_default() += 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fatal.lock().unwrap().contains(step) {
                return Err(ScriptError::Fatal);
            }
            {
                let mut transient = self.transient.lock().unwrap();
                if let Some(left) = transient.get_mut(step) {
                    if *left > 0 {
                        *left -= 1;
                        return Err(ScriptError::Transient);
                    }
                }
            }
            Ok(format!("{step}-out"))
        }
    }

    struct ScriptedJob {
        id: String,
        key: Option<String>,
        class: JobClass,
        script: Arc<Script>,
    }

    impl ScriptedJob {
        fn review(id: &str, script: &Arc<Script>) -> Self {
            Self {
                id: id.to_string(),
                key: None,
                class: JobClass::Review,
                script: Arc::clone(script),
            }
        }
    }

    #[async_trait]
    impl Job for ScriptedJob {
        type Output = Vec<String>;
        type Error = ScriptError;

        fn id(&self) -> String {
            self.id.clone()
        }

        fn lock_key(&self) -> String {
            self.key.clone().unwrap_or_else(|| self.id.clone())
        }

        fn kind(&self) -> &'static str {
            "scripted"
        }

        fn class(&self) -> JobClass {
            self.class
        }

        fn input(&self) -> serde_json::Value {
            serde_json::json!({ "id": self.id })
        }

        async fn run(&self, run: &JobRun) -> Result<Vec<String>, ScriptError> {
            let s = self.script.as_ref();
            let now = s.running.fetch_add(1, Ordering::SeqCst) + 1;
            s.peak.fetch_max(now, Ordering::SeqCst);

            let result = async {
                let a = run.step("a", || s.attempt("a")).await?;
                let b = run.step("b", || s.attempt("b")).await?;
                let c = run.step("c", || s.attempt("c")).await?;
                Ok(vec![a, b, c])
            }
            .await;

            s.running.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn on_failure(&self, _run: &JobRun, _error: &ScriptError) {
            self.script.compensations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            review_concurrency: 5,
            job_deadline: Duration::from_secs(30),
            lease_ttl: Duration::from_secs(60),
            retry: RetryPolicy {
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                ..RetryPolicy::default()
            },
            instance_id: "engine-test".to_string(),
        }
    }

    fn engine_with(cfg: EngineConfig) -> (WorkflowEngine, Arc<InMemoryCheckpointStore>) {
        let store = Arc::new(InMemoryCheckpointStore::new());
        (WorkflowEngine::new(store.clone(), cfg), store)
    }

    async fn settle(engine: &WorkflowEngine) {
        for _ in 0..200 {
            if engine.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine did not settle");
    }

    #[tokio::test]
    async fn failed_job_resumes_after_last_successful_step() {
        let (engine, store) = engine_with(fast_config());
        let script = Script::with_delay(Duration::ZERO);
        script.fail_fatally("c");

        let out = engine.submit(ScriptedJob::review("job-1", &script)).wait().await;
        assert_eq!(
            out,
            JobOutcome::Failed {
                error: "fatal failure".into()
            }
        );
        assert_eq!(script.calls("c"), 1, "fatal errors are not retried");
        assert_eq!(script.compensations.load(Ordering::SeqCst), 1);

        let rec = store.load_job("job-1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(rec.stage, "c");
        assert_eq!(rec.error.as_deref(), Some("fatal failure"));

        script.heal();
        let out = engine.submit(ScriptedJob::review("job-1", &script)).wait().await;
        assert_eq!(
            out,
            JobOutcome::Completed(vec!["a-out".into(), "b-out".into(), "c-out".into()])
        );
        assert_eq!(script.calls("a"), 1);
        assert_eq!(script.calls("b"), 1);
        assert_eq!(script.calls("c"), 2);

        let rec = store.load_job("job-1").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
        assert_eq!(rec.stage, "completed");
        assert_eq!(rec.run, 2);
        assert!(rec.error.is_none());
    }

    #[tokio::test]
    async fn completed_job_is_not_run_again() {
        let (engine, _store) = engine_with(fast_config());
        let script = Script::with_delay(Duration::ZERO);

        let first = engine.submit(ScriptedJob::review("job-2", &script)).wait().await;
        let second = engine.submit(ScriptedJob::review("job-2", &script)).wait().await;

        assert!(first.is_completed());
        assert_eq!(first, second);
        assert_eq!(script.calls("a"), 1);
        assert_eq!(script.calls("c"), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_budget() {
        let (engine, store) = engine_with(fast_config());
        let script = Script::with_delay(Duration::ZERO);
        script.fail_transiently("b", 2);

        let out = engine.submit(ScriptedJob::review("job-3", &script)).wait().await;
        assert!(out.is_completed());
        assert_eq!(script.calls("b"), 3);

        let step = store.load_step("job-3", "b").await.unwrap().unwrap();
        assert_eq!(step.status, StepStatus::Succeeded);
        assert_eq!(step.attempts, 3);
        assert!(step.last_error.is_none());
    }

    #[tokio::test]
    async fn exhausted_retry_budget_fails_the_job() {
        let (engine, store) = engine_with(fast_config());
        let script = Script::with_delay(Duration::ZERO);
        script.fail_transiently("b", 10);

        let out = engine.submit(ScriptedJob::review("job-4", &script)).wait().await;
        assert_eq!(
            out,
            JobOutcome::Failed {
                error: "transient failure".into()
            }
        );
        assert_eq!(script.calls("b"), 3);
        assert_eq!(script.calls("c"), 0);

        let step = store.load_step("job-4", "b").await.unwrap().unwrap();
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.attempts, 3);
        assert_eq!(step.last_error.as_deref(), Some("transient failure"));

        let a = store.load_step("job-4", "a").await.unwrap().unwrap();
        assert_eq!(a.status, StepStatus::Succeeded);
        assert_eq!(a.payload, Some(serde_json::json!("a-out")));
    }

    #[tokio::test]
    async fn attempt_timeout_counts_as_retryable_failure() {
        let mut cfg = fast_config();
        cfg.retry = cfg.retry.with_attempt_timeout(Duration::from_millis(20));
        let (engine, _store) = engine_with(cfg);
        let script = Script::with_delay(Duration::from_millis(200));

        let out = engine.submit(ScriptedJob::review("job-5", &script)).wait().await;
        match out {
            JobOutcome::Failed { error } => assert!(error.contains("timed out"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(script.calls("a"), 3);
        assert_eq!(script.calls("b"), 0);
    }

    #[tokio::test]
    async fn submissions_sharing_a_lock_key_coalesce() {
        let (engine, _store) = engine_with(fast_config());
        let script = Script::with_delay(Duration::from_millis(30));

        let first = engine.submit(ScriptedJob::review("job-6", &script));
        let second = engine.submit(ScriptedJob::review("job-6", &script));
        assert_eq!(engine.in_flight(), 1);

        let (a, b) = tokio::join!(first.wait(), second.wait());
        assert!(a.is_completed());
        assert_eq!(a, b);
        assert_eq!(script.calls("a"), 1);
        assert_eq!(script.calls("c"), 1);
    }

    #[tokio::test]
    async fn job_leased_elsewhere_is_not_run() {
        let (engine, store) = engine_with(fast_config());
        let script = Script::with_delay(Duration::ZERO);
        assert!(
            store
                .try_claim("job-7", "other-process", Duration::from_secs(60))
                .await
                .unwrap()
        );

        let out = engine.submit(ScriptedJob::review("job-7", &script)).wait().await;
        match out {
            JobOutcome::Failed { error } => assert!(error.contains("already in flight"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(script.calls("a"), 0);
    }

    #[tokio::test]
    async fn deadline_abandons_job_after_in_flight_step() {
        let mut cfg = fast_config();
        cfg.job_deadline = Duration::from_millis(300);
        let (engine, store) = engine_with(cfg);
        let script = Script::with_delay(Duration::from_millis(200));

        let out = engine.submit(ScriptedJob::review("job-8", &script)).wait().await;
        match out {
            JobOutcome::Failed { error } => assert!(error.contains("abandoned"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }

        settle(&engine).await;
        assert_eq!(script.calls("a"), 1);
        assert_eq!(script.calls("b"), 1);
        assert_eq!(script.calls("c"), 0, "no step starts after the deadline");

        let b = store.load_step("job-8", "b").await.unwrap().unwrap();
        assert_eq!(b.status, StepStatus::Succeeded);
        let rec = store.load_job("job-8").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Failed);
        assert_eq!(script.compensations.load(Ordering::SeqCst), 1);

        // Lease was released, so a fresh submission picks up at step c.
        let out = engine.submit(ScriptedJob::review("job-8", &script)).wait().await;
        assert!(out.is_completed());
        assert_eq!(script.calls("b"), 1);
        assert_eq!(script.calls("c"), 1);
    }

    #[tokio::test]
    async fn deadline_during_last_step_leaves_job_failed() {
        let mut cfg = fast_config();
        cfg.job_deadline = Duration::from_millis(500);
        let (engine, store) = engine_with(cfg);
        let script = Script::with_delay(Duration::from_millis(200));

        let out = engine.submit(ScriptedJob::review("job-11", &script)).wait().await;
        match out {
            JobOutcome::Failed { error } => assert!(error.contains("abandoned"), "{error}"),
            other => panic!("expected failure, got {other:?}"),
        }

        settle(&engine).await;
        assert_eq!(script.calls("c"), 1);
        let c = store.load_step("job-11", "c").await.unwrap().unwrap();
        assert_eq!(c.status, StepStatus::Succeeded);
        let rec = store.load_job("job-11").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Failed, "ledger agrees with the abandoned handle");
        assert_eq!(script.compensations.load(Ordering::SeqCst), 1);

        let out = engine.submit(ScriptedJob::review("job-11", &script)).wait().await;
        assert!(out.is_completed());
        assert_eq!(script.calls("c"), 1);
        let rec = store.load_job("job-11").await.unwrap().unwrap();
        assert_eq!(rec.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn resumed_job_waits_out_a_lease_left_by_another_owner() {
        let (engine, store) = engine_with(fast_config());
        let script = Script::with_delay(Duration::ZERO);
        assert!(
            store
                .try_claim("job-9", "engine-crashed", Duration::from_millis(200))
                .await
                .unwrap()
        );

        let started = std::time::Instant::now();
        let out = engine.resume(ScriptedJob::review("job-9", &script)).wait().await;
        assert!(out.is_completed(), "{out:?}");
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(script.calls("a"), 1);
    }

    #[tokio::test]
    async fn lease_held_under_own_instance_id_is_reclaimed() {
        let cfg = fast_config();
        let (engine, store) = engine_with(cfg.clone());
        let script = Script::with_delay(Duration::ZERO);
        assert!(
            store
                .try_claim("job-10", &cfg.instance_id, Duration::from_secs(60))
                .await
                .unwrap()
        );

        let out = engine.submit(ScriptedJob::review("job-10", &script)).wait().await;
        assert!(out.is_completed(), "{out:?}");
        assert!(store.load_lease("job-10").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn review_jobs_respect_concurrency_ceiling() {
        let mut cfg = fast_config();
        cfg.review_concurrency = 2;
        let (engine, _store) = engine_with(cfg);
        let script = Script::with_delay(Duration::from_millis(20));

        let handles: Vec<_> = (0..5)
            .map(|i| engine.submit(ScriptedJob::review(&format!("review-{i}"), &script)))
            .collect();
        for h in handles {
            assert!(h.wait().await.is_completed());
        }

        assert_eq!(script.calls("a"), 5);
        assert!(script.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn indexing_jobs_are_not_gated() {
        let mut cfg = fast_config();
        cfg.review_concurrency = 1;
        let (engine, _store) = engine_with(cfg);
        let script = Script::with_delay(Duration::from_millis(50));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                engine.submit(ScriptedJob {
                    id: format!("index-{i}"),
                    key: None,
                    class: JobClass::Indexing,
                    script: Arc::clone(&script),
                })
            })
            .collect();
        for h in handles {
            assert!(h.wait().await.is_completed());
        }

        assert_eq!(script.peak.load(Ordering::SeqCst), 3);
    }
}
