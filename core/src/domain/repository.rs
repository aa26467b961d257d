// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Canonical repository identity and the persisted-state key layout.
//
// Every durable key is derived from the canonical `owner/name` slug plus a
// branch, so the same repository referenced through different URL spellings
// always lands on the same state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix shared by all lock hashes; the sweeper enumerates keys under it.
pub const LOCK_KEY_PREFIX: &str = "locks:";

#[derive(Debug, Error)]
pub enum RepoRefError {
    #[error("unrecognized repository url: {0}")]
    InvalidUrl(String),
}

/// Canonicalized `(owner, name)` pair for a remote repository.
///
/// Accepts `https://github.com/Owner/Repo`, `github.com/Owner/Repo.git`,
/// bare `Owner/Repo`, and friends. Owner and name are lower-cased and any
/// trailing `.git` is stripped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    owner: String,
    name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into().to_lowercase(),
            name: name.into().to_lowercase(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, RepoRefError> {
        let mut rest = input.trim();
        for scheme in ["https://", "http://", "git@"] {
            if let Some(stripped) = rest.strip_prefix(scheme) {
                rest = stripped;
                break;
            }
        }
        // ssh form uses `host:owner/repo`, web forms use `host/owner/repo`
        if let Some(idx) = rest.find("github.com") {
            rest = &rest[idx + "github.com".len()..];
            rest = rest.trim_start_matches([':', '/']);
        }
        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let owner = segments
            .next()
            .ok_or_else(|| RepoRefError::InvalidUrl(input.to_string()))?;
        let name = segments
            .next()
            .ok_or_else(|| RepoRefError::InvalidUrl(input.to_string()))?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        if name.is_empty() {
            return Err(RepoRefError::InvalidUrl(input.to_string()));
        }
        Ok(Self::new(owner, name))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical `owner/name` form used in every storage key.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn lock_key(&self, branch: &str) -> String {
        format!("{LOCK_KEY_PREFIX}{}:{branch}", self.slug())
    }

    pub fn graph_key(&self, branch: &str) -> String {
        format!("graph:{}:{branch}", self.slug())
    }

    pub fn graph_meta_key(&self, branch: &str) -> String {
        format!("graph:meta:{}:{branch}", self.slug())
    }

    pub fn file_shas_key(&self, branch: &str) -> String {
        format!("graph:file_shas:{}:{branch}", self.slug())
    }

    pub fn file_contents_key(&self, branch: &str) -> String {
        format!("graph:file_contents:{}:{branch}", self.slug())
    }

    pub fn head_checked_at_key(&self, branch: &str) -> String {
        format!("graph:head_checked_at:{}:{branch}", self.slug())
    }

    pub fn rate_limited_until_key(&self, branch: &str) -> String {
        format!("graph:rate_limited_until:{}:{branch}", self.slug())
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
