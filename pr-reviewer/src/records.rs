//! Review records: the outcome of a review job as shown to users.
//!
//! Records are keyed by `(repository full name, pr number)`. A completed
//! record is final; a failed one is replaced by the next run's outcome.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{ReviewError, ReviewResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub repository_id: String,
    /// `owner/name`.
    pub repository: String,
    pub pr_number: u64,
    pub pr_title: String,
    pub pr_url: String,
    /// Review markdown, or `Error: ...` for failed runs.
    pub review: String,
    pub status: ReviewStatus,
    pub created_at: DateTime<Utc>,
}

fn record_key(repository: &str, pr_number: u64) -> String {
    format!("{}#{pr_number}", repository.to_lowercase())
}

/// Whether `incoming` may overwrite `existing`.
fn replaces(existing: Option<&ReviewRecord>, incoming: &ReviewRecord) -> bool {
    !matches!(
        (existing.map(|r| r.status), incoming.status),
        (Some(ReviewStatus::Completed), ReviewStatus::Failed)
    )
}

#[async_trait]
pub trait ReviewRecordStore: Send + Sync {
    /// Inserts or replaces the record for its `(repository, pr_number)`.
    ///
    /// A failed record never overwrites a completed one.
    async fn upsert(&self, record: &ReviewRecord) -> ReviewResult<()>;

    async fn get(&self, repository: &str, pr_number: u64) -> ReviewResult<Option<ReviewRecord>>;

    /// Newest first.
    async fn list(&self, repository: &str) -> ReviewResult<Vec<ReviewRecord>>;
}

#[derive(Default)]
pub struct InMemoryReviewStore {
    records: Mutex<HashMap<String, ReviewRecord>>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl ReviewRecordStore for InMemoryReviewStore {
    async fn upsert(&self, record: &ReviewRecord) -> ReviewResult<()> {
        let key = record_key(&record.repository, record.pr_number);
        let mut records = self.records.lock().await;
        if replaces(records.get(&key), record) {
            records.insert(key, record.clone());
        }
        Ok(())
    }

    async fn get(&self, repository: &str, pr_number: u64) -> ReviewResult<Option<ReviewRecord>> {
        let key = record_key(repository, pr_number);
        Ok(self.records.lock().await.get(&key).cloned())
    }

    async fn list(&self, repository: &str) -> ReviewResult<Vec<ReviewRecord>> {
        let mut out: Vec<ReviewRecord> = self
            .records
            .lock()
            .await
            .values()
            .filter(|r| r.repository.eq_ignore_ascii_case(repository))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

/// One JSON file per record under `<root>/reviews/`.
pub struct FileReviewStore {
    root: PathBuf,
    // Serializes read-modify-write of a record within this process.
    write_lock: Mutex<()>,
}

impl FileReviewStore {
    pub async fn open(root: impl Into<PathBuf>) -> ReviewResult<Self> {
        let root = root.into().join("reviews");
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "review store opened");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, repository: &str, pr_number: u64) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(record_key(repository, pr_number).as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        self.root.join(format!("{}.json", &digest[..16]))
    }
}

async fn read_record(path: &Path) -> ReviewResult<Option<ReviewRecord>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ReviewRecordStore for FileReviewStore {
    async fn upsert(&self, record: &ReviewRecord) -> ReviewResult<()> {
        let path = self.path_for(&record.repository, record.pr_number);
        let _guard = self.write_lock.lock().await;

        let existing = read_record(&path).await?;
        if !replaces(existing.as_ref(), record) {
            debug!(repository = %record.repository, pr = record.pr_number, "keeping completed review record");
            return Ok(());
        }

        let tmp = self.root.join(format!(".tmp-{}", Uuid::new_v4()));
        fs::write(&tmp, serde_json::to_vec_pretty(record)?).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(ReviewError::Persistence(format!(
                "could not write {}: {e}",
                path.display()
            )));
        }
        Ok(())
    }

    async fn get(&self, repository: &str, pr_number: u64) -> ReviewResult<Option<ReviewRecord>> {
        read_record(&self.path_for(repository, pr_number)).await
    }

    async fn list(&self, repository: &str) -> ReviewResult<Vec<ReviewRecord>> {
        let mut out = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path).await {
                Ok(Some(r)) if r.repository.eq_ignore_ascii_case(repository) => out.push(r),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable review record"),
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: ReviewStatus, review: &str) -> ReviewRecord {
        ReviewRecord {
            repository_id: "r1".into(),
            repository: "octo/repo".into(),
            pr_number: 42,
            pr_title: "Add feature".into(),
            pr_url: "https://github.com/octo/repo/pull/42".into(),
            review: review.into(),
            status,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn completed_run_replaces_failed_record() {
        let store = InMemoryReviewStore::new();
        store.upsert(&record(ReviewStatus::Failed, "Error: boom")).await.unwrap();
        store.upsert(&record(ReviewStatus::Completed, "LGTM")).await.unwrap();

        let got = store.get("Octo/Repo", 42).await.unwrap().unwrap();
        assert_eq!(got.status, ReviewStatus::Completed);
        assert_eq!(store.len().await, 1);

        store.upsert(&record(ReviewStatus::Failed, "Error: late")).await.unwrap();
        let got = store.get("octo/repo", 42).await.unwrap().unwrap();
        assert_eq!(got.review, "LGTM");
    }

    #[tokio::test]
    async fn file_store_persists_and_lists() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileReviewStore::open(dir.path()).await.unwrap();
            store.upsert(&record(ReviewStatus::Failed, "Error: boom")).await.unwrap();
            store.upsert(&record(ReviewStatus::Completed, "LGTM")).await.unwrap();
        }

        let store = FileReviewStore::open(dir.path()).await.unwrap();
        let got = store.get("octo/repo", 42).await.unwrap().unwrap();
        assert_eq!(got.status, ReviewStatus::Completed);
        assert_eq!(store.list("octo/repo").await.unwrap().len(), 1);
        assert!(store.list("other/repo").await.unwrap().is_empty());
        assert!(store.get("octo/repo", 7).await.unwrap().is_none());
    }
}
