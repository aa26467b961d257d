// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestration commands: the discrete "what to do next" directive every
// coordination response carries. Business outcomes such as conflicts and
// staleness travel inside these, not as transport errors.

use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationAction {
    Proceed,
    Pull,
    Push,
    SwitchTask,
    Stop,
    Wait,
}

/// Whether a conflicting lock sits on a requested file or on a file one
/// import edge away from one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockKind {
    Direct,
    Neighbor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orchestration {
    pub action: OrchestrationAction,
    /// Shell-style hint for the caller, e.g. `git pull --rebase`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Orchestration {
    pub fn proceed(reason: impl Into<String>) -> Self {
        Self {
            action: OrchestrationAction::Proceed,
            command: None,
            reason: reason.into(),
            metadata: None,
        }
    }

    pub fn pull(remote_head: &str) -> Self {
        Self {
            action: OrchestrationAction::Pull,
            command: Some("git pull --rebase".to_string()),
            reason: format!("Your local repo is behind. Current HEAD: {remote_head}"),
            metadata: None,
        }
    }

    pub fn pull_with_heads(remote_head: &str, your_head: &str) -> Self {
        let mut cmd = Self::pull(remote_head);
        cmd.metadata = Some(json!({
            "remote_head": remote_head,
            "your_head": your_head,
        }));
        cmd
    }

    pub fn push(reason: impl Into<String>) -> Self {
        Self {
            action: OrchestrationAction::Push,
            command: Some("git push".to_string()),
            reason: reason.into(),
            metadata: None,
        }
    }

    pub fn switch_task(file_path: &str, locked_by: &str, kind: LockKind) -> Self {
        Self {
            action: OrchestrationAction::SwitchTask,
            command: None,
            reason: format!("{file_path} is locked by {locked_by}"),
            metadata: Some(json!({
                "file_path": file_path,
                "locked_by": locked_by,
                "lock_kind": kind,
            })),
        }
    }

    pub fn wait(file_path: &str, locked_by: &str, kind: LockKind) -> Self {
        Self {
            action: OrchestrationAction::Wait,
            command: None,
            reason: format!("a dependency of your files, {file_path}, is locked by {locked_by}"),
            metadata: Some(json!({
                "file_path": file_path,
                "locked_by": locked_by,
                "lock_kind": kind,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_screaming_snake() {
        let v = serde_json::to_value(OrchestrationAction::SwitchTask).unwrap();
        assert_eq!(v, json!("SWITCH_TASK"));
        let v = serde_json::to_value(OrchestrationAction::Proceed).unwrap();
        assert_eq!(v, json!("PROCEED"));
    }

    #[test]
    fn pull_carries_rebase_command() {
        let cmd = Orchestration::pull_with_heads("abc", "def");
        assert_eq!(cmd.action, OrchestrationAction::Pull);
        assert_eq!(cmd.command.as_deref(), Some("git pull --rebase"));
        assert_eq!(cmd.metadata.unwrap()["your_head"], "def");
    }

    #[test]
    fn switch_task_names_file_and_owner() {
        let cmd = Orchestration::switch_task("src/a.ts", "alice", LockKind::Direct);
        assert!(cmd.reason.contains("src/a.ts"));
        assert!(cmd.reason.contains("alice"));
        assert_eq!(cmd.metadata.unwrap()["lock_kind"], "DIRECT");
    }
}
