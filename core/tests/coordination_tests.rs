// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end coordination scenarios: the orchestration decision function
//! across staleness, contention, release and neighbor locks.

mod common;

use common::Harness;
use concord_core::application::coordination::{
    CoordinationError, PostStatusRequest, ReportedStatus, RepoStatus,
};
use concord_core::domain::events::ActivityKind;
use concord_core::domain::lock::LockStatus;
use concord_core::domain::orchestration::OrchestrationAction;

fn post(
    h: &Harness,
    user: &str,
    files: &[&str],
    status: ReportedStatus,
    agent_head: Option<&str>,
    new_repo_head: Option<&str>,
) -> PostStatusRequest {
    PostStatusRequest {
        repo: h.repo.clone(),
        branch: "main".to_string(),
        file_paths: files.iter().map(|f| f.to_string()).collect(),
        status,
        message: format!("{user} message"),
        agent_head: agent_head.map(|s| s.to_string()),
        new_repo_head: new_repo_head.map(|s| s.to_string()),
        user_id: user.to_string(),
        user_name: user.to_string(),
    }
}

async fn seed_repo(h: &Harness) {
    // b.ts imports a.ts, so releasing a.ts orphans b.ts
    h.remote.put_file("src/a.ts", "export const a = 1;\n").await;
    h.remote.put_file("src/b.ts", "import { a } from \"./a\";\n").await;
    h.remote.set_head("H").await;
}

#[tokio::test]
async fn solo_writing_acquire_graph_overlay_and_release() {
    let h = Harness::new();
    seed_repo(&h).await;

    // acquire
    let outcome = h
        .coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.orchestration.action, OrchestrationAction::Proceed);

    // graph read sees the lock overlaid
    let graph = h.coordination.get_graph(&h.repo, "main", false).await.unwrap();
    let lock = &graph.locks["src/a.ts"];
    assert_eq!(lock.user_id, "alice");
    assert_eq!(lock.status, LockStatus::Writing);

    // release after pushing (head advanced to H2)
    let outcome = h
        .coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Open,
            Some("H"),
            Some("H2"),
        ))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.orchestration.action, OrchestrationAction::Proceed);
    assert_eq!(
        outcome.orphaned_dependencies.unwrap(),
        vec!["src/b.ts".to_string()]
    );

    let graph = h.coordination.get_graph(&h.repo, "main", false).await.unwrap();
    assert!(graph.locks.is_empty());
}

#[tokio::test]
async fn contending_writer_is_told_to_switch_task() {
    let h = Harness::new();
    seed_repo(&h).await;

    h.coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();

    let outcome = h
        .coordination
        .post_status(post(
            &h,
            "bob",
            &["src/a.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.orchestration.action, OrchestrationAction::SwitchTask);
    assert!(outcome.orchestration.reason.contains("src/a.ts"));
    assert!(outcome.orchestration.reason.contains("alice"));
}

#[tokio::test]
async fn stale_writer_is_told_to_pull() {
    let h = Harness::new();
    seed_repo(&h).await;

    let outcome = h
        .coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Writing,
            Some("H_old"),
            None,
        ))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.orchestration.action, OrchestrationAction::Pull);
    assert_eq!(
        outcome.orchestration.command.as_deref(),
        Some("git pull --rebase")
    );
    let metadata = outcome.orchestration.metadata.unwrap();
    assert_eq!(metadata["remote_head"], "H");
    assert_eq!(metadata["your_head"], "H_old");

    // nothing was locked
    assert!(h.locks.get_all(&h.repo, "main").await.unwrap().is_empty());
}

#[tokio::test]
async fn writing_without_agent_head_is_a_validation_error() {
    let h = Harness::new();
    seed_repo(&h).await;

    let err = h
        .coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Writing,
            None,
            None,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::Validation(_)));
}

#[tokio::test]
async fn release_without_pushing_is_refused() {
    let h = Harness::new();
    seed_repo(&h).await;

    let outcome = h
        .coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Open,
            Some("H"),
            Some("H"),
        ))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.orchestration.action, OrchestrationAction::Push);
    assert_eq!(outcome.orchestration.command.as_deref(), Some("git push"));
}

#[tokio::test]
async fn reader_without_agent_head_records_remote_head() {
    let h = Harness::new();
    seed_repo(&h).await;

    let outcome = h
        .coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Reading,
            None,
            None,
        ))
        .await
        .unwrap();
    assert!(outcome.success);
    let entries = outcome.locks.unwrap();
    assert_eq!(entries[0].agent_head, "H");
    assert_eq!(entries[0].status, LockStatus::Reading);
}

#[tokio::test]
async fn stale_reader_is_not_gated() {
    let h = Harness::new();
    seed_repo(&h).await;

    let outcome = h
        .coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Reading,
            Some("H_old"),
            None,
        ))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.orchestration.action, OrchestrationAction::Proceed);
}

#[tokio::test]
async fn reader_conflicts_with_foreign_writer() {
    let h = Harness::new();
    seed_repo(&h).await;

    h.coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();

    let outcome = h
        .coordination
        .post_status(post(
            &h,
            "bob",
            &["src/a.ts"],
            ReportedStatus::Reading,
            None,
            None,
        ))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert_eq!(outcome.orchestration.action, OrchestrationAction::SwitchTask);
}

#[tokio::test]
async fn informational_status_is_recorded_and_proceeds() {
    let h = Harness::new();
    seed_repo(&h).await;
    let mut receiver = h.events.subscribe();

    let outcome = h
        .coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Note("BLOCKED".to_string()),
            None,
            None,
        ))
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.orchestration.action, OrchestrationAction::Proceed);

    let event = receiver.recv().await.unwrap();
    assert_eq!(event.kind, ActivityKind::StatusNote);
    assert_eq!(event.status, "BLOCKED");
}

#[tokio::test]
async fn check_status_reports_stale_before_conflicts() {
    let h = Harness::new();
    seed_repo(&h).await;

    h.coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();

    let report = h
        .coordination
        .check_status(&h.repo, "main", &["src/a.ts".to_string()], "H_old")
        .await
        .unwrap();
    assert_eq!(report.status, RepoStatus::Stale);
    assert_eq!(report.orchestration.action, OrchestrationAction::Pull);
    assert!(report.orchestration.reason.contains('H'));
}

#[tokio::test]
async fn check_status_reports_direct_conflict() {
    let h = Harness::new();
    seed_repo(&h).await;

    h.coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();

    let report = h
        .coordination
        .check_status(&h.repo, "main", &["src/a.ts".to_string()], "H")
        .await
        .unwrap();
    assert_eq!(report.status, RepoStatus::Conflict);
    assert_eq!(report.orchestration.action, OrchestrationAction::SwitchTask);
    assert_eq!(report.locks["src/a.ts"].user_id, "alice");
    let metadata = report.orchestration.metadata.unwrap();
    assert_eq!(metadata["lock_kind"], "DIRECT");
}

#[tokio::test]
async fn check_status_clean_path_proceeds() {
    let h = Harness::new();
    seed_repo(&h).await;

    let report = h
        .coordination
        .check_status(&h.repo, "main", &["src/a.ts".to_string()], "H")
        .await
        .unwrap();
    assert_eq!(report.status, RepoStatus::Ok);
    assert_eq!(report.orchestration.action, OrchestrationAction::Proceed);
    assert!(report.locks.is_empty());
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn check_status_flags_neighbor_locks() {
    let h = Harness::new();
    seed_repo(&h).await;

    // cache the graph so neighbor derivation has edges to walk
    h.coordination.get_graph(&h.repo, "main", false).await.unwrap();

    // alice locks a.ts; bob asks about b.ts which imports a.ts
    h.coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();

    let report = h
        .coordination
        .check_status(&h.repo, "main", &["src/b.ts".to_string()], "H")
        .await
        .unwrap();
    assert_eq!(report.status, RepoStatus::Ok);
    assert_eq!(report.orchestration.action, OrchestrationAction::Wait);
    assert!(report.orchestration.reason.contains("src/a.ts"));
    assert_eq!(report.warnings.len(), 1);
    let metadata = report.orchestration.metadata.unwrap();
    assert_eq!(metadata["lock_kind"], "NEIGHBOR");
}

#[tokio::test]
async fn check_status_without_graph_reports_direct_only() {
    let h = Harness::new();
    seed_repo(&h).await;

    h.coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();

    // no graph has been built; the neighbor relation is unknowable
    let report = h
        .coordination
        .check_status(&h.repo, "main", &["src/b.ts".to_string()], "H")
        .await
        .unwrap();
    assert_eq!(report.status, RepoStatus::Ok);
    assert_eq!(report.orchestration.action, OrchestrationAction::Proceed);
}

#[tokio::test]
async fn check_status_validates_inputs() {
    let h = Harness::new();
    seed_repo(&h).await;

    let err = h
        .coordination
        .check_status(&h.repo, "main", &[], "H")
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::Validation(_)));

    let err = h
        .coordination
        .check_status(&h.repo, "main", &["src/a.ts".to_string()], "")
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinationError::Validation(_)));
}

#[tokio::test]
async fn successful_posts_emit_one_event_per_file() {
    let h = Harness::new();
    seed_repo(&h).await;
    let mut receiver = h.events.subscribe();

    h.coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts", "src/b.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();

    let first = receiver.recv().await.unwrap();
    let second = receiver.recv().await.unwrap();
    assert_eq!(first.kind, ActivityKind::StatusWriting);
    assert_eq!(second.kind, ActivityKind::StatusWriting);
    let mut paths = vec![first.file_path, second.file_path];
    paths.sort();
    assert_eq!(paths, vec!["src/a.ts".to_string(), "src/b.ts".to_string()]);
}

#[tokio::test]
async fn release_all_reports_count() {
    let h = Harness::new();
    seed_repo(&h).await;

    h.coordination
        .post_status(post(
            &h,
            "alice",
            &["src/a.ts", "src/b.ts"],
            ReportedStatus::Writing,
            Some("H"),
            None,
        ))
        .await
        .unwrap();

    let released = h.coordination.release_all(&h.repo, "main").await.unwrap();
    assert_eq!(released, 2);
    assert!(h.locks.get_all(&h.repo, "main").await.unwrap().is_empty());
}

#[tokio::test]
async fn quota_exhaustion_surfaces_as_rate_limited() {
    let h = Harness::new();
    seed_repo(&h).await;
    h.remote.rate_limit(Some(999_000)).await;

    let err = h
        .coordination
        .check_status(&h.repo, "main", &["src/a.ts".to_string()], "H")
        .await
        .unwrap_err();
    match err {
        CoordinationError::RateLimited { reset_at } => assert_eq!(reset_at, Some(999_000)),
        other => panic!("expected rate limit, got {other:?}"),
    }
}
