// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Graph builder integration tests: two-layer diffing, content-addressed
//! caching, full-rebuild triggers, determinism and quota fallback.

mod common;

use common::{content_sha, Harness};
use concord_core::domain::graph::GraphError;
use concord_core::domain::store::KeyValueStore;
use std::sync::atomic::Ordering;

async fn seed_two_files(h: &Harness) {
    h.remote.put_file("src/a.ts", "import { b } from \"./b\";\n").await;
    h.remote.put_file("src/b.ts", "export const b = 1;\n").await;
    h.remote.set_head("c1").await;
}

#[tokio::test]
async fn cold_build_produces_sorted_graph() {
    let h = Harness::new();
    seed_two_files(&h).await;

    let graph = h.graph.get(&h.repo, "main", false).await.unwrap();
    assert_eq!(graph.version, "c1");
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.nodes[0].id, "src/a.ts");
    assert_eq!(graph.nodes[1].id, "src/b.ts");
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].source, "src/a.ts");
    assert_eq!(graph.edges[0].target, "src/b.ts");
    assert_eq!(graph.metadata.files_processed, 2);
    assert_eq!(graph.metadata.edges_found, 1);
}

#[tokio::test]
async fn head_check_window_elides_every_remote_call() {
    let h = Harness::new();
    seed_two_files(&h).await;

    h.graph.get(&h.repo, "main", false).await.unwrap();
    let heads = h.remote.head_fetches.load(Ordering::SeqCst);
    let trees = h.remote.tree_fetches.load(Ordering::SeqCst);

    // inside the freshness window: no HEAD call, no tree call
    let again = h.graph.get(&h.repo, "main", false).await.unwrap();
    assert_eq!(again.version, "c1");
    assert_eq!(h.remote.head_fetches.load(Ordering::SeqCst), heads);
    assert_eq!(h.remote.tree_fetches.load(Ordering::SeqCst), trees);
}

#[tokio::test]
async fn unchanged_head_skips_the_tree() {
    let h = Harness::new();
    seed_two_files(&h).await;

    h.graph.get(&h.repo, "main", false).await.unwrap();
    h.expire_head_check("main").await;

    let trees = h.remote.tree_fetches.load(Ordering::SeqCst);
    h.graph.get(&h.repo, "main", false).await.unwrap();
    // HEAD was re-checked but matched the stored version
    assert!(h.remote.head_fetches.load(Ordering::SeqCst) >= 2);
    assert_eq!(h.remote.tree_fetches.load(Ordering::SeqCst), trees);
}

#[tokio::test]
async fn incremental_update_reparses_only_changed_files() {
    let h = Harness::new();
    seed_two_files(&h).await;
    h.remote.put_file("src/c.ts", "export const c = 1;\n").await;
    h.graph.get(&h.repo, "main", false).await.unwrap();
    let contents = h.remote.content_fetches.load(Ordering::SeqCst);
    assert_eq!(contents, 3);

    // b now imports ./c; a and c are untouched
    h.remote
        .put_file("src/b.ts", "import { c } from \"./c\";\nexport const b = c;\n")
        .await;
    h.remote.set_head("c2").await;
    h.expire_head_check("main").await;

    let graph = h.graph.get(&h.repo, "main", false).await.unwrap();
    assert_eq!(graph.version, "c2");
    assert_eq!(graph.metadata.files_processed, 1);
    assert_eq!(
        h.remote.content_fetches.load(Ordering::SeqCst),
        contents + 1
    );

    let pairs: Vec<(&str, &str)> = graph
        .edges
        .iter()
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();
    assert_eq!(pairs, vec![("src/a.ts", "src/b.ts"), ("src/b.ts", "src/c.ts")]);
}

#[tokio::test]
async fn rename_is_served_from_the_content_cache() {
    let h = Harness::new();
    h.remote.put_file("src/a.ts", "import { b } from \"./b\";\n").await;
    h.remote.put_file("src/b.ts", "export const b = 1;\n").await;
    h.remote.set_head("c1").await;
    h.graph.get(&h.repo, "main", false).await.unwrap();
    let contents = h.remote.content_fetches.load(Ordering::SeqCst);

    // rename b.ts -> c.ts with identical content; a.ts retargets its import
    h.remote.remove_file("src/b.ts").await;
    h.remote.put_file("src/c.ts", "export const b = 1;\n").await;
    h.remote.put_file("src/a.ts", "import { b } from \"./c\";\n").await;
    h.remote.set_head("c2").await;
    h.expire_head_check("main").await;

    let graph = h.graph.get(&h.repo, "main", false).await.unwrap();
    let node_ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(node_ids, vec!["src/a.ts", "src/c.ts"]);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].source, "src/a.ts");
    assert_eq!(graph.edges[0].target, "src/c.ts");

    // only a.ts (new sha) was fetched; c.ts came from the content cache
    assert_eq!(
        h.remote.content_fetches.load(Ordering::SeqCst),
        contents + 1
    );
}

#[tokio::test]
async fn deletion_removes_node_edges_and_cached_content() {
    let h = Harness::new();
    seed_two_files(&h).await;
    h.graph.get(&h.repo, "main", false).await.unwrap();

    let b_sha = content_sha("export const b = 1;\n");
    let cached = h
        .store
        .hash_get_all(&h.repo.file_contents_key("main"))
        .await
        .unwrap();
    assert!(cached.contains_key(&b_sha));

    h.remote.remove_file("src/b.ts").await;
    h.remote.set_head("c2").await;
    h.expire_head_check("main").await;

    let graph = h.graph.get(&h.repo, "main", false).await.unwrap();
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.nodes[0].id, "src/a.ts");
    assert!(graph.edges.is_empty());

    let cached = h
        .store
        .hash_get_all(&h.repo.file_contents_key("main"))
        .await
        .unwrap();
    assert!(!cached.contains_key(&b_sha));
}

#[tokio::test]
async fn new_file_triggers_full_rebuild_resolving_old_imports() {
    let h = Harness::new();
    // a.ts imports ./b which does not exist yet
    h.remote.put_file("src/a.ts", "import { b } from \"./b\";\n").await;
    h.remote.set_head("c1").await;
    let graph = h.graph.get(&h.repo, "main", false).await.unwrap();
    assert!(graph.edges.is_empty());

    // b.ts appears; a.ts is byte-identical but must be reparsed
    h.remote.put_file("src/b.ts", "export const b = 1;\n").await;
    h.remote.set_head("c2").await;
    h.expire_head_check("main").await;

    let graph = h.graph.get(&h.repo, "main", false).await.unwrap();
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].source, "src/a.ts");
    assert_eq!(graph.edges[0].target, "src/b.ts");
    assert_eq!(graph.metadata.files_processed, 2);
}

#[tokio::test]
async fn identical_state_builds_identical_serializations() {
    let h = Harness::new();
    seed_two_files(&h).await;
    h.remote.put_file("src/z.py", "from .a import thing\n").await;

    let first = h.graph.get(&h.repo, "main", true).await.unwrap();
    let second = h.graph.get(&h.repo, "main", true).await.unwrap();
    assert_eq!(
        serde_json::to_string(&first.nodes).unwrap(),
        serde_json::to_string(&second.nodes).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&first.edges).unwrap(),
        serde_json::to_string(&second.edges).unwrap()
    );
}

#[tokio::test]
async fn incremental_builds_converge_to_cold_build() {
    // drive one harness through three commits incrementally
    let incremental = Harness::new();
    incremental.remote.put_file("src/a.ts", "import { b } from \"./b\";\n").await;
    incremental.remote.put_file("src/b.ts", "export const b = 1;\n").await;
    incremental.remote.set_head("c1").await;
    incremental.graph.get(&incremental.repo, "main", false).await.unwrap();

    incremental
        .remote
        .put_file("src/b.ts", "import { c } from \"./c\";\n")
        .await;
    incremental.remote.put_file("src/c.ts", "export const c = 1;\n").await;
    incremental.remote.set_head("c2").await;
    incremental.expire_head_check("main").await;
    incremental.graph.get(&incremental.repo, "main", false).await.unwrap();

    incremental.remote.remove_file("src/a.ts").await;
    incremental.remote.set_head("c3").await;
    incremental.expire_head_check("main").await;
    let stepped = incremental.graph.get(&incremental.repo, "main", false).await.unwrap();

    // a fresh harness cold-builds the same final tree in one pass
    let cold = Harness::new();
    cold.remote.put_file("src/b.ts", "import { c } from \"./c\";\n").await;
    cold.remote.put_file("src/c.ts", "export const c = 1;\n").await;
    cold.remote.set_head("c3").await;
    let direct = cold.graph.get(&cold.repo, "main", false).await.unwrap();

    assert_eq!(stepped.version, direct.version);
    assert_eq!(stepped.nodes, direct.nodes);
    assert_eq!(stepped.edges, direct.edges);
}

#[tokio::test]
async fn unsupported_files_never_become_nodes() {
    let h = Harness::new();
    seed_two_files(&h).await;
    h.remote.put_file("README.md", "# readme\n").await;
    h.remote.put_file("assets/logo.png", "binaryish\n").await;

    let graph = h.graph.get(&h.repo, "main", false).await.unwrap();
    assert_eq!(graph.nodes.len(), 2);
}

#[tokio::test]
async fn rate_limit_serves_last_cached_graph() {
    let h = Harness::new();
    seed_two_files(&h).await;
    let built = h.graph.get(&h.repo, "main", false).await.unwrap();

    h.remote.rate_limit(Some(i64::MAX)).await;
    h.expire_head_check("main").await;

    let fallback = h.graph.get(&h.repo, "main", false).await.unwrap();
    assert_eq!(fallback.version, built.version);
    assert_eq!(fallback.edges, built.edges);

    // the gate is persisted
    let gate = h
        .store
        .get(&h.repo.rate_limited_until_key("main"))
        .await
        .unwrap();
    assert!(gate.is_some());

    // while gated, the remote is left alone entirely
    let heads = h.remote.head_fetches.load(Ordering::SeqCst);
    h.graph.get(&h.repo, "main", false).await.unwrap();
    assert_eq!(h.remote.head_fetches.load(Ordering::SeqCst), heads);
}

#[tokio::test]
async fn rate_limit_without_cache_is_an_error() {
    let h = Harness::new();
    seed_two_files(&h).await;
    h.remote.rate_limit(Some(123_456)).await;

    let err = h.graph.get(&h.repo, "main", false).await.unwrap_err();
    match err {
        GraphError::RateLimited { reset_at } => assert_eq!(reset_at, 123_456),
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

#[tokio::test]
async fn corrupt_cached_blob_forces_a_clean_rebuild() {
    let h = Harness::new();
    seed_two_files(&h).await;
    h.graph.get(&h.repo, "main", false).await.unwrap();

    h.store
        .set(&h.repo.graph_key("main"), "{broken json")
        .await
        .unwrap();
    h.expire_head_check("main").await;

    let graph = h.graph.get(&h.repo, "main", false).await.unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);
}

#[tokio::test]
async fn concurrent_readers_share_one_build() {
    let h = Harness::new();
    seed_two_files(&h).await;

    let first = h.graph.clone();
    let second = h.graph.clone();
    let repo_a = h.repo.clone();
    let repo_b = h.repo.clone();
    let (a, b) = tokio::join!(
        async move { first.get(&repo_a, "main", false).await.unwrap() },
        async move { second.get(&repo_b, "main", false).await.unwrap() },
    );
    assert_eq!(a.version, b.version);
    assert_eq!(h.remote.tree_fetches.load(Ordering::SeqCst), 1);
}
