//! Lazy depth-first walk over a repository's default branch.
//!
//! The root listing is fetched eagerly so an unreachable repository fails
//! fast. Everything below it is fetched only as the consumer pulls files.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, warn};

use crate::errors::GitContextEngineResult;
use crate::git_providers::github::GitHubClient;
use crate::git_providers::types::{ContentEntry, ContentKind, RepoFile, RepoRef};

/// Extensions that never carry reviewable text.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "tiff", "mp3", "wav", "ogg", "flac",
    "mp4", "mov", "avi", "mkv", "webm", "pdf", "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar",
    "jar", "woff", "woff2", "ttf", "otf", "eot", "exe", "dll", "so", "dylib", "bin",
];

pub fn is_binary_path(path: &str) -> bool {
    let Some((_, ext)) = path.rsplit_once('.') else {
        return false;
    };
    if ext.contains('/') {
        return false;
    }
    let ext = ext.to_ascii_lowercase();
    BINARY_EXTENSIONS.contains(&ext.as_str())
}

/// Walk state: a queue of listing entries not yet visited.
pub struct TreeWalker {
    client: GitHubClient,
    repo: RepoRef,
    token: String,
    pending: VecDeque<ContentEntry>,
}

impl TreeWalker {
    /// Lists the repository root. Errors here propagate.
    pub async fn start(
        client: GitHubClient,
        repo: RepoRef,
        token: String,
    ) -> GitContextEngineResult<Self> {
        let root = client.list_dir(&repo, "", &token).await?;
        debug!(repo = %repo, entries = root.len(), "root listing fetched");
        Ok(Self {
            client,
            repo,
            token,
            pending: root.into(),
        })
    }

    /// Returns the next text file, or `None` once the tree is exhausted.
    ///
    /// Directory listing and file read failures are logged and skipped.
    pub async fn next_file(&mut self) -> Option<RepoFile> {
        while let Some(entry) = self.pending.pop_front() {
            match entry.kind {
                ContentKind::Dir => {
                    match self.client.list_dir(&self.repo, &entry.path, &self.token).await {
                        Ok(children) => {
                            // Depth-first: children go before remaining siblings.
                            for child in children.into_iter().rev() {
                                self.pending.push_front(child);
                            }
                        }
                        Err(e) => warn!(path = %entry.path, error = %e, "skipping unreadable directory"),
                    }
                }
                ContentKind::File if is_binary_path(&entry.path) => {
                    debug!(path = %entry.path, "skipping binary file");
                }
                ContentKind::File => {
                    match self.client.get_file(&self.repo, &entry.path, &self.token).await {
                        Ok(Some(content)) => {
                            return Some(RepoFile {
                                path: entry.path,
                                content,
                            });
                        }
                        Ok(None) => debug!(path = %entry.path, "skipping non-utf8 file"),
                        Err(e) => warn!(path = %entry.path, error = %e, "skipping unreadable file"),
                    }
                }
                ContentKind::Symlink | ContentKind::Submodule => {}
            }
        }
        None
    }

    pub fn into_stream(self) -> BoxStream<'static, RepoFile> {
        stream::unfold(self, |mut walker| async move {
            walker.next_file().await.map(|file| (file, walker))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn detects_binary_extensions() {
        assert!(is_binary_path("assets/logo.PNG"));
        assert!(is_binary_path("docs/manual.pdf"));
        assert!(!is_binary_path("src/lib.rs"));
        assert!(!is_binary_path("Makefile"));
        assert!(!is_binary_path("v1.2/README"));
    }

    async fn file_mock(server: &MockServer, p: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/repos/octo/repo/contents/{p}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": STANDARD.encode(body),
                "encoding": "base64"
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn walks_nested_dirs_and_skips_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/repo/contents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "path": "README.md", "type": "file", "size": 5 },
                { "path": "logo.png", "type": "file", "size": 100 },
                { "path": "src", "type": "dir" },
                { "path": "broken", "type": "dir" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/repo/contents/src"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "path": "src/lib.rs", "type": "file", "size": 10 },
                { "path": "src/gone.rs", "type": "file", "size": 10 }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/repo/contents/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/repo/contents/src/gone.rs"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        file_mock(&server, "README.md", "hello").await;
        file_mock(&server, "src/lib.rs", "pub fn x() {}").await;

        let client = GitHubClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let walker = TreeWalker::start(client, RepoRef::new("octo", "repo"), "t".into())
            .await
            .unwrap();
        let files: Vec<RepoFile> = walker.into_stream().collect().await;

        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/lib.rs"]);
        assert_eq!(files[1].content, "pub fn x() {}");
    }

    #[tokio::test]
    async fn root_listing_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitHubClient::new(server.uri(), Duration::from_secs(5)).unwrap();
        let res = TreeWalker::start(client, RepoRef::new("octo", "repo"), "t".into()).await;
        assert!(res.is_err());
    }
}
