//! Provider-agnostic data model for pull requests, repository files and webhooks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::GitContextEngineError;

/// `owner/name` pair identifying a repository on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `"owner/name"`, also used as the repository id in the vector index.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoRef {
    type Err = GitContextEngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let owner = parts.next().unwrap_or("").trim();
        let name = parts.next().unwrap_or("").trim();

        if owner.is_empty() || name.is_empty() || parts.next().is_some() {
            return Err(GitContextEngineError::Validation(format!(
                "invalid repository '{s}', expected 'owner/repo'"
            )));
        }
        Ok(Self::new(owner, name))
    }
}

/// Everything the review needs from a pull request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestDiff {
    pub title: String,
    pub description: Option<String>,
    /// Unified diff text, taken verbatim from the host.
    pub diff: String,
    pub html_url: String,
    pub head_sha: String,
}

/// One text file from the repository's default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
}

/// Comment created on the pull request conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedComment {
    pub id: u64,
    pub html_url: String,
}

/// Desired webhook registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub callback_url: String,
    pub secret: Option<String>,
}

/// Webhook as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: u64,
    pub url: String,
    /// `false` when an existing hook was reused.
    pub created: bool,
}

/// Entry of a directory listing (`GET /repos/{o}/{r}/contents/{path}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_name() {
        let r: RepoRef = "octo/repo".parse().unwrap();
        assert_eq!(r.full_name(), "octo/repo");
        assert!("octo".parse::<RepoRef>().is_err());
        assert!("a/b/c".parse::<RepoRef>().is_err());
    }
}
