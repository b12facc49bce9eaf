//! File-based ledger (JSON on disk).
//!
//! Key: SHA256(job_id), first 16 hex chars.
//! Layout:
//!   <root>/jobs/<hash>/job.json
//!   <root>/jobs/<hash>/steps/<step>.json
//!   <root>/jobs/<hash>/leases/<generation>.json
//!
//! Records are written to a temp file and renamed into place. A lease change
//! (claim, takeover, release) hard-links a new generation, which fails if
//! that generation exists, so two claimants cannot both win.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::WorkflowError;
use crate::ledger::{CheckpointStore, JobLease, JobRecord, JobStatus, StepRecord};

pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Opens (and creates if needed) a ledger rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, WorkflowError> {
        let root = root.into();
        fs::create_dir_all(root.join("jobs")).await?;
        debug!(root = %root.display(), "file checkpoint store opened");
        Ok(Self { root })
    }

    fn job_dir(&self, job_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(job_id.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        self.root.join("jobs").join(&digest[..16])
    }

    fn lease_dir(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join("leases")
    }

    fn step_path(&self, job_id: &str, step: &str) -> PathBuf {
        self.job_dir(job_id)
            .join("steps")
            .join(format!("{}.json", sanitize(step)))
    }
}

/// Filesystem-safe step name.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, WorkflowError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn write_tmp<T: Serialize>(dir: &Path, value: &T) -> Result<PathBuf, WorkflowError> {
    fs::create_dir_all(dir).await?;
    let tmp = dir.join(format!(".tmp-{}", Uuid::new_v4()));
    fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
    Ok(tmp)
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), WorkflowError> {
    let dir = path
        .parent()
        .ok_or_else(|| WorkflowError::Persistence(format!("no parent for {}", path.display())))?;
    let tmp = write_tmp(dir, value).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load_job(&self, job_id: &str) -> Result<Option<JobRecord>, WorkflowError> {
        read_json(&self.job_dir(job_id).join("job.json")).await
    }

    async fn save_job(&self, record: &JobRecord) -> Result<(), WorkflowError> {
        let mut record = record.clone();
        record.updated_at = Utc::now();
        let path = self.job_dir(&record.job_id).join("job.json");
        write_json_atomic(&path, &record).await
    }

    async fn list_unfinished(&self, kind: &str) -> Result<Vec<JobRecord>, WorkflowError> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(self.root.join("jobs")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path().join("job.json");
            match read_json::<JobRecord>(&path).await {
                Ok(Some(r)) if r.kind == kind && r.status == JobStatus::Pending => out.push(r),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable job record"),
            }
        }
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn load_step(
        &self,
        job_id: &str,
        step: &str,
    ) -> Result<Option<StepRecord>, WorkflowError> {
        read_json(&self.step_path(job_id, step)).await
    }

    async fn save_step(&self, record: &StepRecord) -> Result<(), WorkflowError> {
        let mut record = record.clone();
        record.updated_at = Utc::now();
        write_json_atomic(&self.step_path(&record.job_id, &record.step), &record).await
    }

    async fn try_claim(
        &self,
        job_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, WorkflowError> {
        let dir = self.lease_dir(job_id);
        fs::create_dir_all(&dir).await?;
        let tmp = write_tmp(&dir, &JobLease::new(job_id, owner, ttl)).await?;
        let result = publish_lease(&dir, &tmp, |held| match held {
            Some(l) => l.owner == owner || l.is_expired(),
            None => true,
        })
        .await;
        let _ = fs::remove_file(&tmp).await;
        result
    }

    async fn release(&self, job_id: &str, owner: &str) -> Result<(), WorkflowError> {
        let dir = self.lease_dir(job_id);
        if latest_lease(&dir).await?.1.is_none() {
            return Ok(());
        }
        let released = JobLease {
            job_id: job_id.to_string(),
            owner: String::new(),
            expires_at: Utc::now(),
        };
        let tmp = write_tmp(&dir, &released).await?;
        let result = publish_lease(&dir, &tmp, |held| held.is_some_and(|l| l.owner == owner)).await;
        let _ = fs::remove_file(&tmp).await;
        result.map(|_| ())
    }

    async fn load_lease(&self, job_id: &str) -> Result<Option<JobLease>, WorkflowError> {
        Ok(latest_lease(&self.lease_dir(job_id)).await?.1)
    }
}

fn lease_file(generation: u64) -> String {
    format!("{generation:020}.json")
}

/// Highest lease generation in `dir` and its content.
async fn latest_lease(dir: &Path) -> Result<(u64, Option<JobLease>), WorkflowError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((0, None)),
        Err(e) => return Err(e.into()),
    };
    let mut latest = 0u64;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let generation = name
            .to_str()
            .and_then(|n| n.strip_suffix(".json"))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(g) = generation {
            latest = latest.max(g);
        }
    }
    if latest == 0 {
        return Ok((0, None));
    }
    // A pruned generation reads as absent; the next link attempt then collides.
    let held = read_json(&dir.join(lease_file(latest))).await.ok().flatten();
    Ok((latest, held))
}

/// Publishes `tmp` as the next lease generation while `may_replace` accepts
/// the current holder.
///
/// Generations only grow and each one is created by a hard link, which fails
/// if the file exists, so exactly one contender wins each generation.
async fn publish_lease(
    dir: &Path,
    tmp: &Path,
    may_replace: impl Fn(Option<&JobLease>) -> bool,
) -> Result<bool, WorkflowError> {
    loop {
        let (generation, held) = latest_lease(dir).await?;
        if !may_replace(held.as_ref()) {
            return Ok(false);
        }
        let next = generation + 1;
        let target = dir.join(lease_file(next));
        match fs::hard_link(tmp, &target).await {
            Ok(()) => {
                // A stalled writer can recreate a pruned generation below the head.
                if latest_lease(dir).await?.0 != next {
                    let _ = fs::remove_file(&target).await;
                    continue;
                }
                prune_leases(dir, next).await;
                return Ok(true);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(dir = %dir.display(), generation = next, "lease generation taken, re-reading");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Removes generations older than `current`. Best effort.
async fn prune_leases(dir: &Path, current: u64) {
    for generation in current.saturating_sub(8).max(1)..current {
        let _ = fs::remove_file(dir.join(lease_file(generation))).await;
    }
}
