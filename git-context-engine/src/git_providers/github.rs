//! GitHub provider (REST v3).
//!
//! Endpoints used:
//!   * GET    /repos/{owner}/{repo}/pulls/{number}            (JSON and `v3.diff`)
//!   * GET    /repos/{owner}/{repo}/contents/{path}
//!   * POST   /repos/{owner}/{repo}/issues/{number}/comments
//!   * GET    /repos/{owner}/{repo}/hooks
//!   * POST   /repos/{owner}/{repo}/hooks
//!   * DELETE /repos/{owner}/{repo}/hooks/{id}
//!
//! The access token is passed per call; the client itself holds no credentials.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::{Client, RequestBuilder, Response, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, warn};

use crate::errors::{
    GitContextEngineConfigError, GitContextEngineError, GitContextEngineProviderError,
    GitContextEngineResult,
};
use crate::git_providers::types::*;

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_DIFF: &str = "application/vnd.github.v3.diff";

/// GitHub HTTP client wrapper.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_api: String, // "https://api.github.com"
}

impl GitHubClient {
    /// Builds a client with a bounded request timeout.
    pub fn new(base_api: impl Into<String>, timeout: Duration) -> GitContextEngineResult<Self> {
        let base_api = base_api.into();
        let trimmed = base_api.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(GitContextEngineConfigError::InvalidBaseUrl(base_api).into());
        }

        let http = Client::builder()
            .user_agent("code-critic/0.1")
            .timeout(timeout)
            .build()?;

        debug!("Creating GitHubClient with base_api={}", trimmed);
        Ok(Self {
            http,
            base_api: trimmed.to_string(),
        })
    }

    fn repo_url(&self, repo: &RepoRef, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.base_api,
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name),
            tail
        )
    }

    fn authed(&self, req: RequestBuilder, token: &str, accept: &str) -> RequestBuilder {
        req.bearer_auth(token)
            .header(header::ACCEPT, accept)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Sends the request and turns non-success statuses into provider errors.
    async fn send(&self, req: RequestBuilder) -> GitContextEngineResult<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let body = resp.text().await.unwrap_or_default();
        warn!(
            status = status.as_u16(),
            body = %body.chars().take(200).collect::<String>(),
            "GitHub returned non-success status"
        );
        Err(GitContextEngineProviderError::from_status(status.as_u16(), retry_after).into())
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> GitContextEngineResult<T> {
        let resp = self
            .send(self.authed(self.http.get(url), token, ACCEPT_JSON))
            .await?;
        Ok(resp.json().await?)
    }

    /// Fetches PR title/description and its unified diff.
    #[instrument(skip(self, token), fields(repo = %repo))]
    pub async fn fetch_diff(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        token: &str,
    ) -> GitContextEngineResult<PullRequestDiff> {
        let url = self.repo_url(repo, &format!("/pulls/{pr_number}"));

        let pr: GitHubPr = self.get_json(&url, token).await?;
        let diff = self
            .send(self.authed(self.http.get(&url), token, ACCEPT_DIFF))
            .await?
            .text()
            .await?;

        debug!(diff_len = diff.len(), "pull request diff fetched");
        Ok(PullRequestDiff {
            title: pr.title,
            description: pr.body.filter(|b| !b.trim().is_empty()),
            diff,
            html_url: pr.html_url,
            head_sha: pr.head.sha,
        })
    }

    /// Lists one directory of the default branch (`""` is the root).
    pub async fn list_dir(
        &self,
        repo: &RepoRef,
        path: &str,
        token: &str,
    ) -> GitContextEngineResult<Vec<ContentEntry>> {
        let url = self.repo_url(repo, &contents_tail(path));
        self.get_json(&url, token).await
    }

    /// Reads one file of the default branch.
    ///
    /// Returns `Ok(None)` when the content is not valid UTF-8 text.
    pub async fn get_file(
        &self,
        repo: &RepoRef,
        path: &str,
        token: &str,
    ) -> GitContextEngineResult<Option<String>> {
        let url = self.repo_url(repo, &contents_tail(path));
        let file: GitHubFileContent = self.get_json(&url, token).await?;

        if file.encoding.as_deref() != Some("base64") {
            return Err(GitContextEngineProviderError::InvalidResponse(format!(
                "unexpected encoding for {path}: {:?}",
                file.encoding
            ))
            .into());
        }

        let bytes = decode_base64(&file.content.unwrap_or_default())?;
        Ok(String::from_utf8(bytes).ok())
    }

    /// Posts a top-level comment on the pull request conversation.
    #[instrument(skip(self, body, token), fields(repo = %repo, body_len = body.len()))]
    pub async fn post_comment(
        &self,
        repo: &RepoRef,
        pr_number: u64,
        body: &str,
        token: &str,
    ) -> GitContextEngineResult<PostedComment> {
        let url = self.repo_url(repo, &format!("/issues/{pr_number}/comments"));
        let req = self
            .authed(self.http.post(&url), token, ACCEPT_JSON)
            .json(&CommentCreate { body });

        let created: PostedComment = self.send(req).await?.json().await?;
        debug!(comment_id = created.id, "comment posted");
        Ok(created)
    }

    /// Returns the hook pointing at `cfg.callback_url`, creating it if missing.
    #[instrument(skip(self, cfg, token), fields(repo = %repo, url = %cfg.callback_url))]
    pub async fn ensure_webhook(
        &self,
        repo: &RepoRef,
        cfg: &WebhookConfig,
        token: &str,
    ) -> GitContextEngineResult<Webhook> {
        let hooks = self.list_hooks(repo, token).await?;
        let existing = hooks
            .into_iter()
            .find(|h| h.config.url.as_deref() == Some(cfg.callback_url.as_str()));
        if let Some(existing) = existing {
            debug!(hook_id = existing.id, "webhook already registered");
            return Ok(Webhook {
                id: existing.id,
                url: cfg.callback_url.clone(),
                created: false,
            });
        }

        let payload = HookCreate {
            name: "web",
            active: true,
            events: &["pull_request"],
            config: HookCreateConfig {
                url: &cfg.callback_url,
                content_type: "json",
                secret: cfg.secret.as_deref(),
            },
        };
        let url = self.repo_url(repo, "/hooks");
        let req = self
            .authed(self.http.post(&url), token, ACCEPT_JSON)
            .json(&payload);
        let hook: GitHubHook = self.send(req).await?.json().await?;

        Ok(Webhook {
            id: hook.id,
            url: cfg.callback_url.clone(),
            created: true,
        })
    }

    /// Deletes every hook pointing at `callback_url`. No match is not an error.
    #[instrument(skip(self, token), fields(repo = %repo))]
    pub async fn remove_webhook(
        &self,
        repo: &RepoRef,
        callback_url: &str,
        token: &str,
    ) -> GitContextEngineResult<usize> {
        let hooks = self.list_hooks(repo, token).await?;
        let mut removed = 0;
        for hook in hooks
            .into_iter()
            .filter(|h| h.config.url.as_deref() == Some(callback_url))
        {
            let url = self.repo_url(repo, &format!("/hooks/{}", hook.id));
            match self
                .send(self.authed(self.http.delete(&url), token, ACCEPT_JSON))
                .await
            {
                Ok(_) => removed += 1,
                Err(e) if e.is_not_found() => debug!(hook_id = hook.id, "hook already gone"),
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    async fn list_hooks(
        &self,
        repo: &RepoRef,
        token: &str,
    ) -> GitContextEngineResult<Vec<GitHubHook>> {
        let url = self.repo_url(repo, "/hooks?per_page=100");
        self.get_json(&url, token).await
    }
}

fn contents_tail(path: &str) -> String {
    let encoded: Vec<_> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::encode(s).into_owned())
        .collect();
    if encoded.is_empty() {
        "/contents".to_string()
    } else {
        format!("/contents/{}", encoded.join("/"))
    }
}

/// GitHub wraps base64 content at 60 columns.
fn decode_base64(raw: &str) -> GitContextEngineResult<Vec<u8>> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|e| {
        GitContextEngineError::Provider(GitContextEngineProviderError::InvalidResponse(format!(
            "base64: {e}"
        )))
    })
}

#[derive(Debug, Deserialize)]
struct GitHubPr {
    title: String,
    body: Option<String>,
    html_url: String,
    head: GitHubRef,
}

#[derive(Debug, Deserialize)]
struct GitHubRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitHubFileContent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct CommentCreate<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct GitHubHook {
    id: u64,
    #[serde(default)]
    config: GitHubHookConfig,
}

#[derive(Debug, Default, Deserialize)]
struct GitHubHookConfig {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Serialize)]
struct HookCreate<'a> {
    name: &'a str,
    active: bool,
    events: &'a [&'a str],
    config: HookCreateConfig<'a>,
}

#[derive(Debug, Serialize)]
struct HookCreateConfig<'a> {
    url: &'a str,
    content_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<&'a str>,
}
