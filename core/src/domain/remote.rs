// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::repository::RepoRef;
use async_trait::async_trait;
use thiserror::Error;

/// A blob reachable from a commit: repo-relative path, content sha, size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub sha: String,
    pub size: Option<u64>,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("repository, branch or object not found: {0}")]
    NotFound(String),

    /// Quota exhausted upstream. `reset_at` is ms since epoch when the
    /// quota window resets, if the remote reported one.
    #[error("remote quota exhausted")]
    RateLimited { reset_at: Option<i64> },

    #[error("remote transport failure: {0}")]
    Transport(String),

    #[error("unexpected remote response: {0}")]
    Protocol(String),

    /// Binary or oversized content the graph builder should log and skip.
    #[error("unusable content for {path}: {reason}")]
    Content { path: String, reason: String },
}

/// Remote repository port: branch heads, recursive trees, blob content.
#[async_trait]
pub trait RemoteRepository: Send + Sync {
    /// Latest commit id on `branch`.
    async fn head(&self, repo: &RepoRef, branch: &str) -> Result<String, RemoteError>;

    /// Like [`head`](Self::head), but served from a short-lived cache when
    /// the last fetch is younger than `max_age_ms`. `max_age_ms <= 0`
    /// always refreshes.
    async fn head_cached(
        &self,
        repo: &RepoRef,
        branch: &str,
        max_age_ms: i64,
    ) -> Result<String, RemoteError>;

    /// Every blob reachable from `commit`, as a flat list.
    async fn tree(&self, repo: &RepoRef, commit: &str) -> Result<Vec<TreeEntry>, RemoteError>;

    /// UTF-8 content of the blob `sha`. `path` is used for diagnostics.
    async fn file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        sha: &str,
    ) -> Result<String, RemoteError>;
}
