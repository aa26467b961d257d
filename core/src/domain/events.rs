// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of activity derived from a posted status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    StatusWriting,
    StatusReading,
    StatusOpen,
    /// Informational status outside the lock lifecycle.
    StatusNote,
}

/// One observer-facing activity record, emitted per file on every
/// successful status post. Fire-and-forget; never persisted by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub repo: String,
    pub branch: String,
    pub file_path: String,
    pub user_id: String,
    pub user_name: String,
    pub message: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: ActivityKind,
        repo: impl Into<String>,
        branch: impl Into<String>,
        file_path: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
        message: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            repo: repo.into(),
            branch: branch.into(),
            file_path: file_path.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            message: message.into(),
            status: status.into(),
            timestamp: Utc::now(),
        }
    }
}
