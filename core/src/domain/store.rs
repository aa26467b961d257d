// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Key-value storage port.
//
// A thin abstraction over a Redis-compatible store, implemented by the
// production Redis adapter and by an in-memory fake for tests. Lock
// mutation correctness relies on `eval` executing a script with no
// interleaving; both implementations uphold that contract.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store transport failure: {0}")]
    Transport(String),

    #[error("script evaluation failed: {0}")]
    Script(String),
}

/// A server-side script: stable name plus Lua source.
///
/// The Redis adapter evaluates `source` atomically on the server; the
/// in-memory fake dispatches on `name` and runs an equivalent native
/// transaction under a single mutex.
#[derive(Debug, Clone, Copy)]
pub struct ScriptDef {
    pub name: &'static str,
    pub source: &'static str,
}

/// One mutation in a pipelined batch.
#[derive(Debug, Clone)]
pub enum StoreOp {
    Set { key: String, value: String },
    Delete { key: String },
    HashSet { key: String, entries: Vec<(String, String)> },
    HashDelete { key: String, fields: Vec<String> },
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Selected fields of a hash. Missing fields are absent from the result.
    async fn hash_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<HashMap<String, String>, StoreError>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn hash_set(&self, key: &str, entries: &[(String, String)]) -> Result<(), StoreError>;

    async fn hash_delete(&self, key: &str, fields: &[String]) -> Result<(), StoreError>;

    /// All keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Atomic scripted evaluation. The script observes `keys` and `args`
    /// with no interleaving and returns a single string value.
    async fn eval(
        &self,
        script: &ScriptDef,
        keys: &[String],
        args: &[String],
    ) -> Result<String, StoreError>;

    /// Execute a batch of mutations in one round trip.
    async fn pipeline(&self, ops: Vec<StoreOp>) -> Result<(), StoreError>;
}
