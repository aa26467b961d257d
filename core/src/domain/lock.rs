// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::repository::RepoRef;
use crate::domain::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed advisory lock lifetime. Owners extend it by re-acquiring.
pub const LOCK_TTL_MS: i64 = 300_000;

/// What the owner intends to do with the file while the lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LockStatus {
    Reading,
    Writing,
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockStatus::Reading => write!(f, "READING"),
            LockStatus::Writing => write!(f, "WRITING"),
        }
    }
}

/// Advisory lock record for one file on one `(repo, branch)`.
///
/// Stored serialized as a field of the per-branch lock hash. Expiry is
/// passive: readers filter expired entries, the sweeper eventually deletes
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockEntry {
    pub file_path: String,
    pub user_id: String,
    pub user_name: String,
    pub status: LockStatus,
    /// Commit id the owner observed when acquiring.
    pub agent_head: String,
    /// Owner-supplied intent, shown to observers. Never empty.
    pub message: String,
    /// Creation or last refresh, ms since epoch.
    pub timestamp: i64,
    /// `timestamp + LOCK_TTL_MS`, ms since epoch.
    pub expiry: i64,
}

impl LockEntry {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry <= now_ms
    }
}

/// Input to an atomic multi-file acquire.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub repo: RepoRef,
    pub branch: String,
    pub file_paths: Vec<String>,
    pub user_id: String,
    pub user_name: String,
    pub status: LockStatus,
    pub message: String,
    pub agent_head: String,
}

/// Result of an acquire: all files locked, or none with the first conflict.
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    Acquired(Vec<LockEntry>),
    Conflict {
        file_path: String,
        user_id: String,
        user_name: String,
    },
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("invalid lock request: {0}")]
    Invalid(String),

    #[error("lock store failure: {0}")]
    Store(#[from] StoreError),

    #[error("malformed lock transaction response: {0}")]
    InvalidResponse(String),
}
