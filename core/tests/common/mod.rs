// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures: a programmable in-memory remote repository with fetch
//! counters, plus constructors for fully wired services.

use async_trait::async_trait;
use concord_core::application::coordination::CoordinationService;
use concord_core::application::graph::GraphService;
use concord_core::application::locks::LockService;
use concord_core::domain::remote::{RemoteError, RemoteRepository, TreeEntry};
use concord_core::domain::repository::RepoRef;
use concord_core::infrastructure::event_bus::EventBus;
use concord_core::infrastructure::memory_store::InMemoryStore;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct RemoteState {
    head: String,
    /// path -> (sha, content)
    files: HashMap<String, (String, String)>,
    rate_limited_until: Option<i64>,
}

/// In-memory stand-in for the GitHub adapter. Content is addressed by a
/// hash of the text, so renames keep their sha exactly like real blobs.
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
    pub head_fetches: AtomicUsize,
    pub tree_fetches: AtomicUsize,
    pub content_fetches: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_head(&self, head: &str) {
        self.state.lock().await.head = head.to_string();
    }

    pub async fn put_file(&self, path: &str, content: &str) {
        let sha = content_sha(content);
        self.state
            .lock()
            .await
            .files
            .insert(path.to_string(), (sha, content.to_string()));
    }

    pub async fn remove_file(&self, path: &str) {
        self.state.lock().await.files.remove(path);
    }

    pub async fn rate_limit(&self, reset_at: Option<i64>) {
        self.state.lock().await.rate_limited_until = reset_at.or(Some(i64::MAX));
    }

    pub async fn clear_rate_limit(&self) {
        self.state.lock().await.rate_limited_until = None;
    }

    async fn check_quota(&self) -> Result<(), RemoteError> {
        match self.state.lock().await.rate_limited_until {
            Some(reset_at) => Err(RemoteError::RateLimited {
                reset_at: Some(reset_at),
            }),
            None => Ok(()),
        }
    }
}

pub fn content_sha(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("blob-{:016x}", hasher.finish())
}

#[async_trait]
impl RemoteRepository for FakeRemote {
    async fn head(&self, _repo: &RepoRef, branch: &str) -> Result<String, RemoteError> {
        self.check_quota().await?;
        self.head_fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        if state.head.is_empty() {
            return Err(RemoteError::NotFound(branch.to_string()));
        }
        Ok(state.head.clone())
    }

    async fn head_cached(
        &self,
        repo: &RepoRef,
        branch: &str,
        _max_age_ms: i64,
    ) -> Result<String, RemoteError> {
        self.head(repo, branch).await
    }

    async fn tree(&self, _repo: &RepoRef, _commit: &str) -> Result<Vec<TreeEntry>, RemoteError> {
        self.check_quota().await?;
        self.tree_fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        Ok(state
            .files
            .iter()
            .map(|(path, (sha, content))| TreeEntry {
                path: path.clone(),
                sha: sha.clone(),
                size: Some(content.len() as u64),
            })
            .collect())
    }

    async fn file_content(
        &self,
        _repo: &RepoRef,
        path: &str,
        sha: &str,
    ) -> Result<String, RemoteError> {
        self.check_quota().await?;
        self.content_fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        state
            .files
            .values()
            .find(|(candidate, _)| candidate == sha)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("{path}@{sha}")))
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub remote: Arc<FakeRemote>,
    pub locks: Arc<LockService>,
    pub graph: Arc<GraphService>,
    pub coordination: Arc<CoordinationService>,
    pub events: Arc<EventBus>,
    pub repo: RepoRef,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let remote = Arc::new(FakeRemote::new());
        let locks = Arc::new(LockService::new(store.clone()));
        let graph = Arc::new(GraphService::new(store.clone(), remote.clone()));
        let events = Arc::new(EventBus::with_default_capacity());
        let coordination = Arc::new(CoordinationService::new(
            locks.clone(),
            graph.clone(),
            remote.clone(),
            events.clone(),
        ));
        Self {
            store,
            remote,
            locks,
            graph,
            coordination,
            events,
            repo: RepoRef::parse("https://github.com/Acme/Widgets").unwrap(),
        }
    }

    /// Push the head-check guard into the past so the next graph read
    /// re-checks the remote instead of serving the freshness window.
    pub async fn expire_head_check(&self, branch: &str) {
        use concord_core::domain::store::KeyValueStore;
        let key = self.repo.head_checked_at_key(branch);
        let past = chrono::Utc::now().timestamp_millis() - 60_000;
        self.store.set(&key, &past.to_string()).await.unwrap();
    }
}
