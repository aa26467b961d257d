// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-memory implementation of the key-value port for tests and local
// development. A single mutex around the whole map gives `eval` the same
// no-interleaving guarantee the Redis scripts have; the two lock scripts
// are dispatched by name and executed as native transactions mirroring
// their Lua sources.

use crate::application::locks::{ACQUIRE_SCRIPT, RELEASE_SCRIPT};
use crate::domain::store::{KeyValueStore, ScriptDef, StoreError, StoreOp};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Default)]
pub struct InMemoryStore {
    data: Mutex<HashMap<String, Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw hash field directly, bypassing every protocol. Tests
    /// use this to plant expired or malformed lock entries.
    pub async fn seed_hash_field(&self, key: &str, field: &str, value: &str) {
        let mut data = self.data.lock().await;
        match data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()))
        {
            Value::Hash(map) => {
                map.insert(field.to_string(), value.to_string());
            }
            Value::Text(_) => panic!("seed_hash_field on a string key"),
        }
    }

    fn hash_of(data: &HashMap<String, Value>, key: &str) -> HashMap<String, String> {
        match data.get(key) {
            Some(Value::Hash(map)) => map.clone(),
            _ => HashMap::new(),
        }
    }

    /// Native rendition of ACQUIRE_SCRIPT: abort on the first live foreign
    /// entry, otherwise install everything.
    fn eval_acquire(
        data: &mut HashMap<String, Value>,
        key: &str,
        args: &[String],
    ) -> Result<String, StoreError> {
        let parse = |i: usize| -> Result<&String, StoreError> {
            args.get(i)
                .ok_or_else(|| StoreError::Script("acquire: missing argument".into()))
        };
        let now: i64 = parse(0)?
            .parse()
            .map_err(|_| StoreError::Script("acquire: bad now".into()))?;
        let user = parse(1)?.clone();
        let count: usize = parse(2)?
            .parse()
            .map_err(|_| StoreError::Script("acquire: bad count".into()))?;
        if args.len() < 3 + count * 2 {
            return Err(StoreError::Script("acquire: truncated argv".into()));
        }

        let existing = Self::hash_of(data, key);
        for i in 0..count {
            let path = &args[3 + i];
            if let Some(raw) = existing.get(path) {
                if let Ok(entry) = serde_json::from_str::<serde_json::Value>(raw) {
                    let expiry = entry["expiry"].as_i64().unwrap_or(0);
                    let holder = entry["user_id"].as_str().unwrap_or("");
                    if expiry > now && holder != user {
                        let reply = json!({
                            "conflict": {
                                "file_path": path,
                                "user_id": holder,
                                "user_name": entry["user_name"].as_str().unwrap_or(""),
                            }
                        });
                        return Ok(reply.to_string());
                    }
                }
            }
        }

        let map = match data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()))
        {
            Value::Hash(map) => map,
            Value::Text(_) => return Err(StoreError::Script("acquire: key holds a string".into())),
        };
        for i in 0..count {
            map.insert(args[3 + i].clone(), args[3 + count + i].clone());
        }
        Ok(json!({ "ok": true }).to_string())
    }

    /// Native rendition of RELEASE_SCRIPT: owner-guarded deletes, malformed
    /// entries dropped.
    fn eval_release(
        data: &mut HashMap<String, Value>,
        key: &str,
        args: &[String],
    ) -> Result<String, StoreError> {
        let user = args
            .first()
            .ok_or_else(|| StoreError::Script("release: missing user".into()))?
            .clone();
        let mut released = Vec::new();
        if let Some(Value::Hash(map)) = data.get_mut(key) {
            for path in &args[1..] {
                let Some(raw) = map.get(path) else { continue };
                let owner_matches = match serde_json::from_str::<serde_json::Value>(raw) {
                    Ok(entry) => entry["user_id"].as_str() == Some(user.as_str()),
                    Err(_) => true,
                };
                if owner_matches {
                    map.remove(path);
                    released.push(path.clone());
                }
            }
        }
        Ok(json!({ "released": released }).to_string())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let data = self.data.lock().await;
        match data.get(key) {
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.insert(key.to_string(), Value::Text(value.to_string()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        data.remove(key);
        Ok(())
    }

    async fn hash_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<HashMap<String, String>, StoreError> {
        let data = self.data.lock().await;
        let map = Self::hash_of(&data, key);
        Ok(fields
            .iter()
            .filter_map(|f| map.get(f).map(|v| (f.clone(), v.clone())))
            .collect())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let data = self.data.lock().await;
        Ok(Self::hash_of(&data, key))
    }

    async fn hash_set(&self, key: &str, entries: &[(String, String)]) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        let map = match data
            .entry(key.to_string())
            .or_insert_with(|| Value::Hash(HashMap::new()))
        {
            Value::Hash(map) => map,
            Value::Text(_) => return Err(StoreError::Transport("key holds a string".into())),
        };
        for (field, value) in entries {
            map.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hash_delete(&self, key: &str, fields: &[String]) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        if let Some(Value::Hash(map)) = data.get_mut(key) {
            for field in fields {
                map.remove(field);
            }
        }
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.lock().await;
        Ok(data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn eval(
        &self,
        script: &ScriptDef,
        keys: &[String],
        args: &[String],
    ) -> Result<String, StoreError> {
        let key = keys
            .first()
            .ok_or_else(|| StoreError::Script("eval requires one key".into()))?;
        let mut data = self.data.lock().await;
        match script.name {
            name if name == ACQUIRE_SCRIPT.name => Self::eval_acquire(&mut data, key, args),
            name if name == RELEASE_SCRIPT.name => Self::eval_release(&mut data, key, args),
            other => Err(StoreError::Script(format!("unknown script: {other}"))),
        }
    }

    async fn pipeline(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        for op in ops {
            match op {
                StoreOp::Set { key, value } => {
                    data.insert(key, Value::Text(value));
                }
                StoreOp::Delete { key } => {
                    data.remove(&key);
                }
                StoreOp::HashSet { key, entries } => {
                    let map = match data.entry(key).or_insert_with(|| Value::Hash(HashMap::new()))
                    {
                        Value::Hash(map) => map,
                        Value::Text(_) => {
                            return Err(StoreError::Transport("key holds a string".into()))
                        }
                    };
                    for (field, value) in entries {
                        map.insert(field, value);
                    }
                }
                StoreOp::HashDelete { key, fields } => {
                    if let Some(Value::Hash(map)) = data.get_mut(&key) {
                        for field in fields {
                            map.remove(&field);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
