// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::lock::LockEntry;
use crate::domain::remote::RemoteError;
use crate::domain::store::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Source language of a graph node, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Ts,
    Js,
    Py,
}

impl Language {
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit_once('.').map(|(_, e)| e)?;
        match ext {
            "ts" | "tsx" => Some(Language::Ts),
            "js" | "jsx" => Some(Language::Js),
            "py" => Some(Language::Py),
            _ => None,
        }
    }
}

/// True for the file extensions the graph builder understands.
pub fn is_supported_path(path: &str) -> bool {
    Language::from_path(path).is_some()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub language: Language,
}

impl GraphNode {
    pub fn file(id: impl Into<String>, size: Option<u64>, language: Language) -> Self {
        Self {
            id: id.into(),
            node_type: "file".to_string(),
            size,
            language,
        }
    }
}

/// Directed import edge: `source` imports `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

impl GraphEdge {
    pub fn import(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type: "import".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Build instant, ms since epoch.
    pub generated_at: i64,
    /// Files parsed during the build that produced this graph.
    pub files_processed: usize,
    pub edges_found: usize,
}

/// The cached file-import graph for one `(repo, branch)`.
///
/// The structural part (`nodes`, `edges`, `version`, `metadata`) is
/// persisted; `locks` is overlaid fresh from the lock engine on every read
/// and never stored inside the blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub locks: HashMap<String, LockEntry>,
    /// Commit id the structural part was last reconciled against.
    pub version: String,
    pub metadata: GraphMetadata,
}

impl DependencyGraph {
    /// Canonical ordering so identical inputs serialize identically:
    /// nodes by id, edges by `(source, target)`.
    pub fn sort(&mut self) {
        self.nodes.sort_by(|a, b| a.id.cmp(&b.id));
        self.edges
            .sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        self.edges
            .dedup_by(|a, b| a.source == b.source && a.target == b.target);
    }

    /// Files with an edge into any of `targets`, excluding the targets
    /// themselves. Used to report orphaned dependencies on release.
    pub fn dependents_of(&self, targets: &HashSet<String>) -> Vec<String> {
        let mut out: Vec<String> = self
            .edges
            .iter()
            .filter(|e| targets.contains(&e.target) && !targets.contains(&e.source))
            .map(|e| e.source.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// One-hop neighborhood of `files`: everything they import plus
    /// everything importing them.
    pub fn neighbors_of(&self, files: &HashSet<String>) -> HashSet<String> {
        let mut out = HashSet::new();
        for edge in &self.edges {
            if files.contains(&edge.source) && !files.contains(&edge.target) {
                out.insert(edge.target.clone());
            }
            if files.contains(&edge.target) && !files.contains(&edge.source) {
                out.insert(edge.source.clone());
            }
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("remote failure during graph build: {0}")]
    Remote(#[from] RemoteError),

    #[error("store failure during graph build: {0}")]
    Store(#[from] StoreError),

    /// Quota exhausted and no cached graph available to fall back on.
    #[error("graph unavailable, rate limited until {reset_at}")]
    RateLimited { reset_at: i64 },

    #[error("graph serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
