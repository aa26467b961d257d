// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Dependency Graph Builder
//
// Keeps one cached file-import graph per (repo, branch), reconciled
// against the remote through a two-layer diff: a cheap HEAD equality
// check first, a per-file content-sha comparison only when HEAD moved.
// File content is fetched by content sha, so renames and unchanged files
// never hit the remote twice. Builds are single-flight per key; quota
// exhaustion degrades to the last cached graph behind a wall-clock gate.

use crate::domain::graph::{
    is_supported_path, DependencyGraph, GraphEdge, GraphError, GraphMetadata, GraphNode, Language,
};
use crate::domain::remote::{RemoteError, RemoteRepository, TreeEntry};
use crate::domain::repository::RepoRef;
use crate::domain::store::{KeyValueStore, StoreOp};
use crate::application::imports::{extract_imports, ResolutionCache};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Repo-level HEAD checks are elided when the last one is younger than
/// this window.
pub const HEAD_CHECK_MIN_INTERVAL_MS: i64 = 20_000;

/// Validity window handed to the remote adapter's HEAD cache.
pub const HEAD_CACHE_MAX_AGE_MS: i64 = 10_000;

/// Cooldown applied when the remote rate-limits us without a reset hint.
pub const RATE_LIMIT_FALLBACK_COOLDOWN_MS: i64 = 60_000;

pub struct GraphService {
    store: Arc<dyn KeyValueStore>,
    remote: Arc<dyn RemoteRepository>,
    /// Per-(repo, branch) build guards: concurrent readers serialize here,
    /// and every follower is served by the cache the leader just wrote.
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GraphService {
    pub fn new(store: Arc<dyn KeyValueStore>, remote: Arc<dyn RemoteRepository>) -> Self {
        Self {
            store,
            remote,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// The current graph for `(repo, branch)`, rebuilt incrementally if the
    /// remote HEAD moved. `force` skips both diff layers and reprocesses
    /// every file. The returned graph carries no lock overlay; callers
    /// apply locks at read time.
    pub async fn get(
        &self,
        repo: &RepoRef,
        branch: &str,
        force: bool,
    ) -> Result<DependencyGraph, GraphError> {
        let guard = self.flight_guard(repo, branch).await;
        let _held = guard.lock().await;
        self.get_serialized(repo, branch, force).await
    }

    /// The cached structural graph, if any, without touching the remote.
    /// Best-effort read used for neighbor-lock and orphan derivations.
    pub async fn peek_cached(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<DependencyGraph>, GraphError> {
        self.load_cached(repo, branch).await
    }

    async fn flight_guard(&self, repo: &RepoRef, branch: &str) -> Arc<Mutex<()>> {
        let key = format!("{}:{branch}", repo.slug());
        let mut inflight = self.inflight.lock().await;
        Arc::clone(inflight.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    async fn get_serialized(
        &self,
        repo: &RepoRef,
        branch: &str,
        force: bool,
    ) -> Result<DependencyGraph, GraphError> {
        let now = Utc::now().timestamp_millis();

        // quota gate: inside the cooldown window we never touch the remote
        if let Some(until) = self.read_scalar(&repo.rate_limited_until_key(branch)).await? {
            if now < until {
                if let Some(cached) = self.load_cached(repo, branch).await? {
                    debug!(repo = %repo, branch, "serving cached graph inside rate-limit window");
                    return Ok(cached);
                }
                return Err(GraphError::RateLimited { reset_at: until });
            }
        }

        let version = self.store.get(&repo.graph_meta_key(branch)).await?;

        // layer 1a: elide even the HEAD call inside the check window
        if !force && version.is_some() {
            if let Some(checked_at) = self
                .read_scalar(&repo.head_checked_at_key(branch))
                .await?
            {
                if now - checked_at < HEAD_CHECK_MIN_INTERVAL_MS {
                    if let Some(cached) = self.load_cached(repo, branch).await? {
                        return Ok(cached);
                    }
                }
            }
        }

        // layer 1b: HEAD equality
        let head = match self
            .remote
            .head_cached(repo, branch, HEAD_CACHE_MAX_AGE_MS)
            .await
        {
            Ok(head) => head,
            Err(RemoteError::RateLimited { reset_at }) => {
                return self.rate_limited_fallback(repo, branch, reset_at, now).await;
            }
            Err(e) => return Err(e.into()),
        };
        self.store
            .set(&repo.head_checked_at_key(branch), &now.to_string())
            .await?;

        if !force && version.as_deref() == Some(head.as_str()) {
            if let Some(cached) = self.load_cached(repo, branch).await? {
                return Ok(cached);
            }
            // version matches but the blob is gone or corrupt; fall through
        }

        match self.rebuild(repo, branch, &head, force, now).await {
            Ok(graph) => Ok(graph),
            Err(GraphError::Remote(RemoteError::RateLimited { reset_at })) => {
                self.rate_limited_fallback(repo, branch, reset_at, now).await
            }
            Err(e) => Err(e),
        }
    }

    /// Layer 2: per-file sha diff against the stored map, reparse of the
    /// affected files, and a single pipelined persistence batch.
    async fn rebuild(
        &self,
        repo: &RepoRef,
        branch: &str,
        head: &str,
        force: bool,
        now: i64,
    ) -> Result<DependencyGraph, GraphError> {
        let tree = self.remote.tree(repo, head).await?;
        let new_map: HashMap<String, TreeEntry> = tree
            .into_iter()
            .filter(|entry| is_supported_path(&entry.path))
            .map(|entry| (entry.path.clone(), entry))
            .collect();
        let old_map = self.store.hash_get_all(&repo.file_shas_key(branch)).await?;

        let mut added: Vec<&String> = Vec::new();
        let mut changed: Vec<&String> = Vec::new();
        for (path, entry) in &new_map {
            match old_map.get(path) {
                None => added.push(path),
                Some(old_sha) if *old_sha != entry.sha => changed.push(path),
                Some(_) => {}
            }
        }
        let deleted: Vec<&String> = old_map
            .keys()
            .filter(|path| !new_map.contains_key(*path))
            .collect();

        let cached = if force {
            None
        } else {
            self.load_cached(repo, branch).await?
        };

        // New files can satisfy previously unresolvable imports, so their
        // presence forces a full pass. So does a missing or corrupt blob.
        let full = force || !added.is_empty() || cached.is_none();
        let to_parse: Vec<String> = if full {
            new_map.keys().cloned().collect()
        } else {
            changed.iter().map(|p| (*p).clone()).collect()
        };
        info!(
            repo = %repo,
            branch,
            head,
            full,
            files = new_map.len(),
            added = added.len(),
            changed = changed.len(),
            deleted = deleted.len(),
            parsing = to_parse.len(),
            "rebuilding dependency graph"
        );

        let file_set: HashSet<String> = new_map.keys().cloned().collect();
        let mut cache = ResolutionCache::new();
        let mut parsed_edges: Vec<GraphEdge> = Vec::new();
        for path in &to_parse {
            let entry = &new_map[path];
            let Some(language) = Language::from_path(path) else {
                continue;
            };
            let content = match self.content_for(repo, branch, path, &entry.sha).await {
                Ok(content) => content,
                Err(RemoteError::Content { path, reason }) => {
                    warn!(%path, %reason, "skipping unusable file content");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            for module in extract_imports(language, &content) {
                if let Some(target) = cache.resolve(path, &module, &file_set) {
                    if target != *path {
                        parsed_edges.push(GraphEdge::import(path.clone(), target));
                    }
                }
            }
        }

        let mut edges = if full {
            parsed_edges
        } else {
            let reparsed: HashSet<&String> = changed.iter().copied().collect();
            let mut kept: Vec<GraphEdge> = cached
                .as_ref()
                .map(|graph| {
                    graph
                        .edges
                        .iter()
                        // outbound edges of reparsed files are rebuilt
                        // exhaustively; edges touching deleted files go
                        .filter(|e| !reparsed.contains(&e.source))
                        .filter(|e| {
                            file_set.contains(&e.source) && file_set.contains(&e.target)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            kept.extend(parsed_edges);
            kept
        };
        edges.retain(|e| file_set.contains(&e.source) && file_set.contains(&e.target));

        let nodes: Vec<GraphNode> = new_map
            .values()
            .filter_map(|entry| {
                Language::from_path(&entry.path)
                    .map(|language| GraphNode::file(entry.path.clone(), entry.size, language))
            })
            .collect();

        let mut graph = DependencyGraph {
            nodes,
            edges,
            locks: HashMap::new(),
            version: head.to_string(),
            metadata: GraphMetadata {
                generated_at: now,
                files_processed: to_parse.len(),
                edges_found: 0,
            },
        };
        graph.sort();
        graph.metadata.edges_found = graph.edges.len();

        self.persist(repo, branch, &graph, &new_map, &old_map, &deleted, now)
            .await?;
        Ok(graph)
    }

    async fn persist(
        &self,
        repo: &RepoRef,
        branch: &str,
        graph: &DependencyGraph,
        new_map: &HashMap<String, TreeEntry>,
        old_map: &HashMap<String, String>,
        deleted: &[&String],
        now: i64,
    ) -> Result<(), GraphError> {
        let sha_updates: Vec<(String, String)> = new_map
            .iter()
            .filter(|(path, entry)| old_map.get(*path) != Some(&entry.sha))
            .map(|(path, entry)| (path.clone(), entry.sha.clone()))
            .collect();

        let mut ops = vec![
            StoreOp::Set {
                key: repo.graph_key(branch),
                value: serde_json::to_string(graph)?,
            },
            StoreOp::Set {
                key: repo.graph_meta_key(branch),
                value: graph.version.clone(),
            },
            StoreOp::Set {
                key: repo.head_checked_at_key(branch),
                value: now.to_string(),
            },
        ];
        if !sha_updates.is_empty() {
            ops.push(StoreOp::HashSet {
                key: repo.file_shas_key(branch),
                entries: sha_updates,
            });
        }
        if !deleted.is_empty() {
            ops.push(StoreOp::HashDelete {
                key: repo.file_shas_key(branch),
                fields: deleted.iter().map(|p| (*p).clone()).collect(),
            });
        }
        self.store.pipeline(ops).await?;

        // best-effort eviction of content entries no file references
        let referenced: HashSet<&String> = new_map.values().map(|e| &e.sha).collect();
        let stale: Vec<String> = old_map
            .values()
            .filter(|sha| !referenced.contains(*sha))
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if !stale.is_empty() {
            if let Err(e) = self
                .store
                .hash_delete(&repo.file_contents_key(branch), &stale)
                .await
            {
                warn!(error = %e, "content cache eviction failed");
            }
        }
        Ok(())
    }

    /// Content-addressed fetch: the cache is keyed by blob sha, so a rename
    /// or an unchanged file across commits never refetches.
    async fn content_for(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
        sha: &str,
    ) -> Result<String, RemoteError> {
        let contents_key = repo.file_contents_key(branch);
        let cached = self
            .store
            .hash_get(&contents_key, &[sha.to_string()])
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        if let Some(content) = cached.get(sha) {
            return Ok(content.clone());
        }
        let content = self.remote.file_content(repo, path, sha).await?;
        if let Err(e) = self
            .store
            .hash_set(&contents_key, &[(sha.to_string(), content.clone())])
            .await
        {
            warn!(error = %e, %path, "content cache write failed");
        }
        Ok(content)
    }

    async fn rate_limited_fallback(
        &self,
        repo: &RepoRef,
        branch: &str,
        reset_at: Option<i64>,
        now: i64,
    ) -> Result<DependencyGraph, GraphError> {
        let until = reset_at.unwrap_or(now + RATE_LIMIT_FALLBACK_COOLDOWN_MS);
        if let Err(e) = self
            .store
            .set(&repo.rate_limited_until_key(branch), &until.to_string())
            .await
        {
            warn!(error = %e, "failed to persist rate-limit gate");
        }
        warn!(repo = %repo, branch, until, "remote rate limited");
        if let Some(cached) = self.load_cached(repo, branch).await? {
            return Ok(cached);
        }
        Err(GraphError::RateLimited { reset_at: until })
    }

    async fn load_cached(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<DependencyGraph>, GraphError> {
        let Some(raw) = self.store.get(&repo.graph_key(branch)).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<DependencyGraph>(&raw) {
            Ok(graph) => Ok(Some(graph)),
            Err(e) => {
                // corruption is treated as absence; the next build overwrites
                warn!(repo = %repo, branch, error = %e, "cached graph blob is corrupt");
                Ok(None)
            }
        }
    }

    async fn read_scalar(&self, key: &str) -> Result<Option<i64>, GraphError> {
        Ok(self
            .store
            .get(key)
            .await?
            .and_then(|raw| raw.parse::<i64>().ok()))
    }
}
