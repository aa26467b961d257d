// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Redis implementation of the key-value port.
//
// One multiplexed connection per operation; scripts run through EVALSHA
// with automatic source upload, so lock transactions execute atomically
// on the server.

use crate::domain::store::{KeyValueStore, ScriptDef, StoreError, StoreOp};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;

pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    pub fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::Transport(format!("invalid redis url: {e}")))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(transport)
    }
}

fn transport(e: redis::RedisError) -> StoreError {
    StoreError::Transport(e.to_string())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(transport)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.set(key, value).await.map_err(transport)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: i64 = conn.del(key).await.map_err(transport)?;
        Ok(())
    }

    async fn hash_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        if fields.is_empty() {
            return Ok(HashMap::new());
        }
        let mut conn = self.connection().await?;
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(fields
            .iter()
            .zip(values)
            .filter_map(|(field, value)| value.map(|v| (field.clone(), v)))
            .collect())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.connection().await?;
        conn.hgetall(key).await.map_err(transport)
    }

    async fn hash_set(&self, key: &str, entries: &[(String, String)]) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let _: () = conn.hset_multiple(key, entries).await.map_err(transport)?;
        Ok(())
    }

    async fn hash_delete(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let _: i64 = conn.hdel(key, fields).await.map_err(transport)?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let mut out = Vec::new();
        let pattern = format!("{prefix}*");
        let mut iter: redis::AsyncIter<String> = conn
            .scan_match(&pattern)
            .await
            .map_err(transport)?;
        while let Some(key) = iter.next_item().await {
            out.push(key);
        }
        Ok(out)
    }

    async fn eval(
        &self,
        script: &ScriptDef,
        keys: &[String],
        args: &[String],
    ) -> Result<String, StoreError> {
        let mut conn = self.connection().await?;
        let prepared = redis::Script::new(script.source);
        let mut invocation = prepared.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }
        invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Script(format!("{}: {e}", script.name)))
    }

    async fn pipeline(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        for op in &ops {
            match op {
                StoreOp::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                StoreOp::Delete { key } => {
                    pipe.del(key).ignore();
                }
                StoreOp::HashSet { key, entries } => {
                    pipe.hset_multiple(key, entries).ignore();
                }
                StoreOp::HashDelete { key, fields } => {
                    pipe.hdel(key, fields).ignore();
                }
            }
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(transport)?;
        Ok(())
    }
}
