// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordination API
//
// Composes the lock engine, the remote adapter and the graph builder into
// the three operations agents call: check_status, post_status, get_graph.
// Conflicts and staleness are business outcomes carried inside the
// orchestration command, never transport errors.

use crate::application::graph::{GraphService, HEAD_CACHE_MAX_AGE_MS};
use crate::application::locks::LockService;
use crate::domain::events::{ActivityEvent, ActivityKind};
use crate::domain::graph::{DependencyGraph, GraphError};
use crate::domain::lock::{AcquireOutcome, AcquireRequest, LockEntry, LockError, LockStatus};
use crate::domain::orchestration::{LockKind, Orchestration};
use crate::domain::remote::{RemoteError, RemoteRepository};
use crate::domain::repository::RepoRef;
use crate::infrastructure::event_bus::EventBus;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Aggregate repository status relative to one agent's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepoStatus {
    Ok,
    Stale,
    Conflict,
}

/// Result of `check_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: RepoStatus,
    pub repo_head: String,
    pub locks: HashMap<String, LockEntry>,
    pub warnings: Vec<String>,
    pub orchestration: Orchestration,
}

/// Status an agent reports through `post_status`. Anything outside the
/// lock lifecycle is carried through as an informational note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedStatus {
    Writing,
    Reading,
    Open,
    Note(String),
}

impl ReportedStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "WRITING" => ReportedStatus::Writing,
            "READING" => ReportedStatus::Reading,
            "OPEN" => ReportedStatus::Open,
            other => ReportedStatus::Note(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReportedStatus::Writing => "WRITING",
            ReportedStatus::Reading => "READING",
            ReportedStatus::Open => "OPEN",
            ReportedStatus::Note(s) => s,
        }
    }
}

/// Input to `post_status`, transport-agnostic.
#[derive(Debug, Clone)]
pub struct PostStatusRequest {
    pub repo: RepoRef,
    pub branch: String,
    pub file_paths: Vec<String>,
    pub status: ReportedStatus,
    pub message: String,
    pub agent_head: Option<String>,
    pub new_repo_head: Option<String>,
    pub user_id: String,
    pub user_name: String,
}

/// Result of `post_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostStatusOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locks: Option<Vec<LockEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orphaned_dependencies: Option<Vec<String>>,
    pub orchestration: Orchestration,
}

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("missing or invalid field: {0}")]
    Validation(String),

    /// Remote quota exhausted on a freshness-required path.
    #[error("remote quota exhausted")]
    RateLimited { reset_at: Option<i64> },

    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<LockError> for CoordinationError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Invalid(msg) => CoordinationError::Validation(msg),
            other => CoordinationError::Internal(other.to_string()),
        }
    }
}

impl From<RemoteError> for CoordinationError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::RateLimited { reset_at } => CoordinationError::RateLimited { reset_at },
            other => CoordinationError::Internal(other.to_string()),
        }
    }
}

impl From<GraphError> for CoordinationError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::RateLimited { reset_at } => CoordinationError::RateLimited {
                reset_at: Some(reset_at),
            },
            GraphError::Remote(RemoteError::RateLimited { reset_at }) => {
                CoordinationError::RateLimited { reset_at }
            }
            other => CoordinationError::Internal(other.to_string()),
        }
    }
}

pub struct CoordinationService {
    locks: Arc<LockService>,
    graph: Arc<GraphService>,
    remote: Arc<dyn RemoteRepository>,
    events: Arc<EventBus>,
}

impl CoordinationService {
    pub fn new(
        locks: Arc<LockService>,
        graph: Arc<GraphService>,
        remote: Arc<dyn RemoteRepository>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            locks,
            graph,
            remote,
            events,
        }
    }

    /// Staleness and conflict snapshot for the files an agent wants to
    /// touch, plus the next action it should take.
    ///
    /// HEAD and locks are two separate reads; the result is a snapshot
    /// approximation and a later `post_status(WRITING)` may still be
    /// rejected.
    pub async fn check_status(
        &self,
        repo: &RepoRef,
        branch: &str,
        file_paths: &[String],
        agent_head: &str,
    ) -> Result<StatusReport, CoordinationError> {
        if branch.is_empty() {
            return Err(CoordinationError::Validation("branch is required".into()));
        }
        if file_paths.is_empty() {
            return Err(CoordinationError::Validation(
                "file_paths must not be empty".into(),
            ));
        }
        if agent_head.is_empty() {
            return Err(CoordinationError::Validation("agent_head is required".into()));
        }

        let repo_head = self
            .remote
            .head_cached(repo, branch, HEAD_CACHE_MAX_AGE_MS)
            .await?;
        let is_stale = agent_head != repo_head;
        let locks = self.locks.check(repo, branch, file_paths).await?;

        let mut warnings = Vec::new();
        let neighbor = if locks.is_empty() && !is_stale {
            self.neighbor_conflict(repo, branch, file_paths, &mut warnings)
                .await
        } else {
            None
        };

        let (status, orchestration) = if is_stale {
            (RepoStatus::Stale, Orchestration::pull(&repo_head))
        } else if let Some(first) = file_paths.iter().find_map(|p| locks.get(p)) {
            (
                RepoStatus::Conflict,
                Orchestration::switch_task(&first.file_path, &first.user_name, LockKind::Direct),
            )
        } else if let Some((file, owner)) = neighbor {
            (RepoStatus::Ok, Orchestration::wait(&file, &owner, LockKind::Neighbor))
        } else {
            (RepoStatus::Ok, Orchestration::proceed("no conflicts, repo up to date"))
        };

        debug!(repo = %repo, branch, ?status, "check_status");
        Ok(StatusReport {
            status,
            repo_head,
            locks,
            warnings,
            orchestration,
        })
    }

    /// A lock held by someone else on a file one import edge away from the
    /// requested set. Best-effort: without a cached graph only direct
    /// conflicts are reported.
    async fn neighbor_conflict(
        &self,
        repo: &RepoRef,
        branch: &str,
        file_paths: &[String],
        warnings: &mut Vec<String>,
    ) -> Option<(String, String)> {
        let graph = self.graph.peek_cached(repo, branch).await.ok().flatten()?;
        let all_locks = self.locks.get_all(repo, branch).await.ok()?;
        if all_locks.is_empty() {
            return None;
        }
        let requested: HashSet<String> = file_paths.iter().cloned().collect();
        let neighbors = graph.neighbors_of(&requested);
        let mut hits: Vec<&LockEntry> = all_locks
            .values()
            .filter(|entry| neighbors.contains(&entry.file_path))
            .collect();
        hits.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        let hit = hits.first()?;
        warnings.push(format!(
            "{} depends on or is depended on by your files and is locked by {}",
            hit.file_path, hit.user_name
        ));
        Some((hit.file_path.clone(), hit.user_name.clone()))
    }

    /// Post a lifecycle status: acquire (WRITING/READING), release (OPEN),
    /// or record an informational note. Emits one activity event per file
    /// on success.
    pub async fn post_status(
        &self,
        request: PostStatusRequest,
    ) -> Result<PostStatusOutcome, CoordinationError> {
        if request.branch.is_empty() {
            return Err(CoordinationError::Validation("branch is required".into()));
        }
        if request.file_paths.is_empty() {
            return Err(CoordinationError::Validation(
                "file_paths must not be empty".into(),
            ));
        }
        if request.message.trim().is_empty() {
            return Err(CoordinationError::Validation("message is required".into()));
        }
        if request.user_id.is_empty() {
            return Err(CoordinationError::Validation("user identity is required".into()));
        }

        match request.status.clone() {
            ReportedStatus::Open => self.handle_release(request).await,
            ReportedStatus::Writing => self.handle_acquire(request, LockStatus::Writing).await,
            ReportedStatus::Reading => self.handle_acquire(request, LockStatus::Reading).await,
            ReportedStatus::Note(_) => {
                self.publish_events(&request, ActivityKind::StatusNote);
                Ok(PostStatusOutcome {
                    success: true,
                    locks: None,
                    orphaned_dependencies: None,
                    orchestration: Orchestration::proceed("status recorded"),
                })
            }
        }
    }

    async fn handle_release(
        &self,
        request: PostStatusRequest,
    ) -> Result<PostStatusOutcome, CoordinationError> {
        // completion claimed without the branch having advanced: the agent
        // has not pushed, so refuse the release and say so
        if let (Some(new_head), Some(agent_head)) =
            (request.new_repo_head.as_deref(), request.agent_head.as_deref())
        {
            if !new_head.is_empty() && new_head == agent_head {
                return Ok(PostStatusOutcome {
                    success: false,
                    locks: None,
                    orphaned_dependencies: None,
                    orchestration: Orchestration::push(
                        "the branch head has not advanced; push your work before releasing",
                    ),
                });
            }
        }

        let released = self
            .locks
            .release(
                &request.repo,
                &request.branch,
                &request.file_paths,
                &request.user_id,
            )
            .await?;

        let orphaned = self
            .orphaned_dependencies(&request.repo, &request.branch, &request.file_paths)
            .await;
        for path in &released {
            self.events.publish(ActivityEvent::new(
                ActivityKind::StatusOpen,
                request.repo.slug(),
                request.branch.clone(),
                path.clone(),
                request.user_id.clone(),
                request.user_name.clone(),
                request.message.clone(),
                request.status.as_str().to_string(),
            ));
        }
        info!(
            repo = %request.repo,
            branch = %request.branch,
            user = %request.user_id,
            released = released.len(),
            "locks released"
        );
        Ok(PostStatusOutcome {
            success: true,
            locks: None,
            orphaned_dependencies: Some(orphaned),
            orchestration: Orchestration::proceed("locks released"),
        })
    }

    /// Files that import one of the released paths without being released
    /// themselves. Best-effort from the cached graph; empty when no graph
    /// is available.
    async fn orphaned_dependencies(
        &self,
        repo: &RepoRef,
        branch: &str,
        released: &[String],
    ) -> Vec<String> {
        match self.graph.peek_cached(repo, branch).await {
            Ok(Some(graph)) => {
                let targets: HashSet<String> = released.iter().cloned().collect();
                graph.dependents_of(&targets)
            }
            _ => Vec::new(),
        }
    }

    async fn handle_acquire(
        &self,
        request: PostStatusRequest,
        status: LockStatus,
    ) -> Result<PostStatusOutcome, CoordinationError> {
        let repo_head = self
            .remote
            .head_cached(&request.repo, &request.branch, HEAD_CACHE_MAX_AGE_MS)
            .await?;

        let agent_head = match status {
            LockStatus::Writing => {
                let Some(head) = request.agent_head.clone().filter(|h| !h.is_empty()) else {
                    return Err(CoordinationError::Validation(
                        "agent_head is required for WRITING".into(),
                    ));
                };
                if head != repo_head {
                    return Ok(PostStatusOutcome {
                        success: false,
                        locks: None,
                        orphaned_dependencies: None,
                        orchestration: Orchestration::pull_with_heads(&repo_head, &head),
                    });
                }
                head
            }
            // readers are not gated on staleness; record the freshest
            // head we know when the agent did not supply one
            LockStatus::Reading => request
                .agent_head
                .clone()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| repo_head.clone()),
        };

        let outcome = self
            .locks
            .acquire(&AcquireRequest {
                repo: request.repo.clone(),
                branch: request.branch.clone(),
                file_paths: request.file_paths.clone(),
                user_id: request.user_id.clone(),
                user_name: request.user_name.clone(),
                status,
                message: request.message.clone(),
                agent_head,
            })
            .await?;

        match outcome {
            AcquireOutcome::Conflict {
                file_path,
                user_name,
                ..
            } => Ok(PostStatusOutcome {
                success: false,
                locks: None,
                orphaned_dependencies: None,
                orchestration: Orchestration::switch_task(&file_path, &user_name, LockKind::Direct),
            }),
            AcquireOutcome::Acquired(entries) => {
                let kind = match status {
                    LockStatus::Writing => ActivityKind::StatusWriting,
                    LockStatus::Reading => ActivityKind::StatusReading,
                };
                self.publish_events(&request, kind);
                info!(
                    repo = %request.repo,
                    branch = %request.branch,
                    user = %request.user_id,
                    files = entries.len(),
                    %status,
                    "locks acquired"
                );
                Ok(PostStatusOutcome {
                    success: true,
                    locks: Some(entries),
                    orphaned_dependencies: None,
                    orchestration: Orchestration::proceed("locks acquired"),
                })
            }
        }
    }

    /// The dependency graph with live locks overlaid at read time.
    pub async fn get_graph(
        &self,
        repo: &RepoRef,
        branch: &str,
        force: bool,
    ) -> Result<DependencyGraph, CoordinationError> {
        let mut graph = self.graph.get(repo, branch, force).await?;
        graph.locks = self.locks.get_all(repo, branch).await?;
        Ok(graph)
    }

    /// Administrative wipe of every lock on `(repo, branch)`.
    pub async fn release_all(&self, repo: &RepoRef, branch: &str) -> Result<u64, CoordinationError> {
        let released = self.locks.release_all(repo, branch).await?;
        info!(repo = %repo, branch, released, "released all locks");
        Ok(released)
    }

    fn publish_events(&self, request: &PostStatusRequest, kind: ActivityKind) {
        for path in &request.file_paths {
            self.events.publish(ActivityEvent::new(
                kind,
                request.repo.slug(),
                request.branch.clone(),
                path.clone(),
                request.user_id.clone(),
                request.user_name.clone(),
                request.message.clone(),
                request.status.as_str().to_string(),
            ));
        }
    }
}
