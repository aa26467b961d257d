// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// GitHub REST v3 adapter for the remote repository port.
//
// Anti-Corruption Layer: GitHub wire shapes stay in this file. Quota
// exhaustion is detected from the rate-limit headers and surfaced as a
// distinguished error carrying the reset instant so callers can gate on
// it.

use crate::domain::remote::{RemoteError, RemoteRepository, TreeEntry};
use crate::domain::repository::RepoRef;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Blobs past this size are skipped rather than parsed.
const MAX_CONTENT_BYTES: usize = 1_000_000;

const USER_AGENT: &str = concat!("concord/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Deserialize)]
struct BranchCommit {
    sha: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    item_type: String,
    sha: String,
    #[serde(default)]
    size: Option<u64>,
}

pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    /// `(owner/name, branch)` -> `(sha, fetched_at_ms)`.
    head_cache: Mutex<HashMap<(String, String), (String, i64)>>,
}

impl GitHubClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            head_cache: Mutex::new(HashMap::new()),
        }
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        req
    }

    /// Classify a non-success response, preferring the rate-limit signal.
    async fn classify_error(response: reqwest::Response, context: &str) -> RemoteError {
        let status = response.status();
        let remaining = header_str(&response, "x-ratelimit-remaining");
        let reset_at = header_str(&response, "x-ratelimit-reset")
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(|secs| secs * 1000);

        if status.as_u16() == 429 || (status.as_u16() == 403 && remaining.as_deref() == Some("0")) {
            return RemoteError::RateLimited { reset_at };
        }
        if status.as_u16() == 404 {
            return RemoteError::NotFound(context.to_string());
        }
        let body = response.text().await.unwrap_or_default();
        RemoteError::Protocol(format!("{context}: HTTP {status}: {body}"))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        context: &str,
    ) -> Result<T, RemoteError> {
        let response = self
            .request(url)
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::classify_error(response, context).await);
        }
        response
            .json()
            .await
            .map_err(|e| RemoteError::Protocol(format!("{context}: {e}")))
    }
}

fn header_str(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

#[async_trait]
impl RemoteRepository for GitHubClient {
    async fn head(&self, repo: &RepoRef, branch: &str) -> Result<String, RemoteError> {
        let url = format!(
            "{}/repos/{}/{}/branches/{branch}",
            self.base_url,
            repo.owner(),
            repo.name()
        );
        let parsed: BranchResponse = self
            .get_json(&url, &format!("{repo}@{branch}"))
            .await?;
        let sha = parsed.commit.sha;

        let now = Utc::now().timestamp_millis();
        let mut cache = self.head_cache.lock().await;
        cache.insert((repo.slug(), branch.to_string()), (sha.clone(), now));
        Ok(sha)
    }

    async fn head_cached(
        &self,
        repo: &RepoRef,
        branch: &str,
        max_age_ms: i64,
    ) -> Result<String, RemoteError> {
        if max_age_ms > 0 {
            let now = Utc::now().timestamp_millis();
            let cache = self.head_cache.lock().await;
            if let Some((sha, fetched_at)) = cache.get(&(repo.slug(), branch.to_string())) {
                if now - fetched_at <= max_age_ms {
                    debug!(repo = %repo, branch, "HEAD served from cache");
                    return Ok(sha.clone());
                }
            }
        }
        self.head(repo, branch).await
    }

    async fn tree(&self, repo: &RepoRef, commit: &str) -> Result<Vec<TreeEntry>, RemoteError> {
        let url = format!(
            "{}/repos/{}/{}/git/trees/{commit}?recursive=1",
            self.base_url,
            repo.owner(),
            repo.name()
        );
        let parsed: TreeResponse = self
            .get_json(&url, &format!("{repo}@{commit} tree"))
            .await?;
        if parsed.truncated {
            warn!(repo = %repo, commit, "remote tree listing was truncated");
        }
        Ok(parsed
            .tree
            .into_iter()
            .filter(|item| item.item_type == "blob")
            .map(|item| TreeEntry {
                path: item.path,
                sha: item.sha,
                size: item.size,
            })
            .collect())
    }

    async fn file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        sha: &str,
    ) -> Result<String, RemoteError> {
        let url = format!(
            "{}/repos/{}/{}/git/blobs/{sha}",
            self.base_url,
            repo.owner(),
            repo.name()
        );
        let response = self
            .request(&url)
            .header("Accept", "application/vnd.github.raw+json")
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::classify_error(response, &format!("{repo}:{path}")).await);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if bytes.len() > MAX_CONTENT_BYTES {
            return Err(RemoteError::Content {
                path: path.to_string(),
                reason: format!("{} bytes exceeds limit", bytes.len()),
            });
        }
        String::from_utf8(bytes.to_vec()).map_err(|_| RemoteError::Content {
            path: path.to_string(),
            reason: "not valid utf-8".to_string(),
        })
    }
}
