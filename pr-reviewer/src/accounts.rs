//! Read-only view of the user/account registry.
//!
//! Users, linked accounts and connected repositories are owned by the CRUD
//! layer; the review pipeline only looks up repository ownership and a user's
//! access token.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::errors::ReviewResult;

/// Repository connected by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub user_id: String,
}

impl RepositoryEntry {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Linked source-host account of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    /// Provider id, e.g. `github`.
    pub provider: String,
    pub access_token: Option<String>,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// GitHub access token of `user_id`, if one is linked.
    async fn access_token(&self, user_id: &str) -> ReviewResult<Option<String>>;

    async fn repository(&self, owner: &str, name: &str) -> ReviewResult<Option<RepositoryEntry>>;
}

/// Snapshot of the registry as exported by the CRUD layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

/// Registry held in memory, optionally seeded from a JSON snapshot.
#[derive(Default)]
pub struct InMemoryDirectory {
    repositories: RwLock<HashMap<(String, String), RepositoryEntry>>,
    tokens: RwLock<HashMap<String, String>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DirectorySnapshot) -> Self {
        let repositories = snapshot
            .repositories
            .into_iter()
            .map(|r| ((r.owner.to_lowercase(), r.name.to_lowercase()), r))
            .collect();
        let tokens = snapshot
            .accounts
            .into_iter()
            .filter(|a| a.provider == "github")
            .filter_map(|a| a.access_token.map(|t| (a.user_id, t)))
            .collect();
        Self {
            repositories: RwLock::new(repositories),
            tokens: RwLock::new(tokens),
        }
    }

    /// Loads a [`DirectorySnapshot`]; a missing file yields an empty registry.
    pub async fn load(path: &Path) -> ReviewResult<Self> {
        let snapshot = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice::<DirectorySnapshot>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DirectorySnapshot::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            repositories = snapshot.repositories.len(),
            accounts = snapshot.accounts.len(),
            "account directory loaded"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub async fn put_repository(&self, entry: RepositoryEntry) {
        let key = (entry.owner.to_lowercase(), entry.name.to_lowercase());
        self.repositories.write().await.insert(key, entry);
    }

    pub async fn put_token(&self, user_id: &str, token: &str) {
        self.tokens
            .write()
            .await
            .insert(user_id.to_string(), token.to_string());
    }

    pub async fn remove_token(&self, user_id: &str) {
        self.tokens.write().await.remove(user_id);
    }
}

#[async_trait]
impl AccountDirectory for InMemoryDirectory {
    async fn access_token(&self, user_id: &str) -> ReviewResult<Option<String>> {
        Ok(self
            .tokens
            .read()
            .await
            .get(user_id)
            .filter(|t| !t.trim().is_empty())
            .cloned())
    }

    async fn repository(&self, owner: &str, name: &str) -> ReviewResult<Option<RepositoryEntry>> {
        let key = (owner.to_lowercase(), name.to_lowercase());
        Ok(self.repositories.read().await.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_lookup_is_case_insensitive_and_github_only() {
        let dir = InMemoryDirectory::from_snapshot(DirectorySnapshot {
            repositories: vec![RepositoryEntry {
                id: "r1".into(),
                owner: "Octo".into(),
                name: "Repo".into(),
                user_id: "u1".into(),
            }],
            accounts: vec![
                Account {
                    user_id: "u1".into(),
                    provider: "github".into(),
                    access_token: Some("gh-token".into()),
                },
                Account {
                    user_id: "u2".into(),
                    provider: "gitlab".into(),
                    access_token: Some("gl-token".into()),
                },
            ],
        });

        let repo = dir.repository("octo", "repo").await.unwrap().unwrap();
        assert_eq!(repo.full_name(), "Octo/Repo");
        assert_eq!(dir.access_token("u1").await.unwrap().as_deref(), Some("gh-token"));
        assert!(dir.access_token("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_snapshot_file_is_an_empty_registry() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = InMemoryDirectory::load(&tmp.path().join("nope.json")).await.unwrap();
        assert!(dir.repository("octo", "repo").await.unwrap().is_none());
    }
}
