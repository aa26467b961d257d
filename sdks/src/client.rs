// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{bail, Result};
use concord_core::application::coordination::{PostStatusOutcome, StatusReport};
use concord_core::domain::graph::DependencyGraph;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

const USER_ID_HEADER: &str = "x-concord-user-id";
const USER_NAME_HEADER: &str = "x-concord-user-name";
const SWEEPER_SECRET_HEADER: &str = "x-concord-sweeper-secret";

/// Client for interacting with a Concord coordination service.
pub struct ConcordClient {
    base_url: String,
    client: Client,
    user_id: Option<String>,
    user_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckStatusArgs {
    pub repo_url: String,
    pub branch: String,
    pub file_paths: Vec<String>,
    pub agent_head: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostStatusArgs {
    pub repo_url: String,
    pub branch: String,
    pub file_paths: Vec<String>,
    /// `WRITING`, `READING`, `OPEN` or an informational note.
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_head: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_repo_head: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SweepReport {
    pub success: bool,
    pub cleaned: u64,
    pub timestamp: i64,
}

impl ConcordClient {
    /// Create a new Concord client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            user_id: None,
            user_name: None,
        }
    }

    /// Set the identity attached to every status post.
    pub fn with_user(mut self, user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.user_name = Some(user_name.into());
        self
    }

    /// Staleness/conflict snapshot for the files the agent wants to touch.
    pub async fn check_status(&self, args: &CheckStatusArgs) -> Result<StatusReport> {
        let url = format!("{}/api/v1/status/check", self.base_url);
        let response = self.client.post(&url).json(args).send().await?;
        Self::decode(response).await
    }

    /// Post a lifecycle status (acquire, release or note).
    pub async fn post_status(&self, args: &PostStatusArgs) -> Result<PostStatusOutcome> {
        let url = format!("{}/api/v1/status", self.base_url);
        let mut req = self.client.post(&url).json(args);
        if let Some(user_id) = &self.user_id {
            req = req.header(USER_ID_HEADER, user_id);
        }
        if let Some(user_name) = &self.user_name {
            req = req.header(USER_NAME_HEADER, user_name);
        }
        let response = req.send().await?;
        Self::decode(response).await
    }

    /// The dependency graph with live locks overlaid.
    pub async fn get_graph(
        &self,
        repo_url: &str,
        branch: &str,
        regenerate: bool,
    ) -> Result<DependencyGraph> {
        let url = format!("{}/api/v1/graph", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("repo_url", repo_url),
                ("branch", branch),
                ("regenerate", if regenerate { "true" } else { "false" }),
            ])
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Administrative wipe of every lock on `(repo, branch)`. Returns the
    /// number of released entries.
    pub async fn release_all(&self, repo_url: &str, branch: &str) -> Result<u64> {
        let url = format!("{}/api/v1/locks/release-all", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "repo_url": repo_url, "branch": branch }))
            .send()
            .await?;
        let body: serde_json::Value = Self::decode(response).await?;
        Ok(body["released"].as_u64().unwrap_or(0))
    }

    /// Trigger a stale-lock sweep; requires the shared sweeper secret.
    pub async fn cleanup_stale_locks(&self, secret: &str) -> Result<SweepReport> {
        let url = format!("{}/api/v1/internal/cleanup", self.base_url);
        let response = self
            .client
            .post(&url)
            .header(SWEEPER_SECRET_HEADER, secret)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Service liveness.
    pub async fn health(&self) -> Result<serde_json::Value> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = body["error"].as_str().unwrap_or("unknown error");
            bail!("concord request failed (HTTP {status}): {message}");
        }
        Ok(response.json().await?)
    }
}
