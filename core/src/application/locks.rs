// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Lock Engine
//
// Atomic multi-file advisory locks per (repo, branch), kept in a single
// store hash `locks:{repo}:{branch}` mapping file path -> serialized
// LockEntry. Acquire and release run as scripted transactions so two
// racing acquires can never both install entries for the same file.
// Expiry is passive: read paths filter expired entries, the sweeper
// physically deletes them.

use crate::domain::lock::{
    AcquireOutcome, AcquireRequest, LockEntry, LockError, LOCK_TTL_MS,
};
use crate::domain::repository::{RepoRef, LOCK_KEY_PREFIX};
use crate::domain::store::{KeyValueStore, ScriptDef};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Check-then-commit acquire. ARGV: now, user_id, count, `count` paths,
/// then `count` serialized entries. Aborts on the first live foreign lock;
/// otherwise installs every entry. Expired or malformed entries count as
/// absent.
pub const ACQUIRE_SCRIPT: ScriptDef = ScriptDef {
    name: "concord:acquire",
    source: r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local user = ARGV[2]
local count = tonumber(ARGV[3])
for i = 1, count do
  local existing = redis.call('HGET', key, ARGV[3 + i])
  if existing then
    local ok, entry = pcall(cjson.decode, existing)
    if ok and type(entry) == 'table' and entry.expiry and tonumber(entry.expiry) > now and entry.user_id ~= user then
      return cjson.encode({ conflict = {
        file_path = ARGV[3 + i],
        user_id = entry.user_id,
        user_name = entry.user_name or '',
      }})
    end
  end
end
for i = 1, count do
  redis.call('HSET', key, ARGV[3 + i], ARGV[3 + count + i])
end
return cjson.encode({ ok = true })
"#,
};

/// Owner-guarded delete. ARGV: user_id, then paths. Foreign live entries
/// are skipped silently; malformed entries are dropped.
pub const RELEASE_SCRIPT: ScriptDef = ScriptDef {
    name: "concord:release",
    source: r#"
local key = KEYS[1]
local user = ARGV[1]
local released = {}
for i = 2, #ARGV do
  local existing = redis.call('HGET', key, ARGV[i])
  if existing then
    local ok, entry = pcall(cjson.decode, existing)
    if not ok or type(entry) ~= 'table' or entry.user_id == user then
      redis.call('HDEL', key, ARGV[i])
      released[#released + 1] = ARGV[i]
    end
  end
end
if #released == 0 then
  return '{"released":[]}'
end
return cjson.encode({ released = released })
"#,
};

#[derive(Deserialize)]
struct ScriptConflict {
    file_path: String,
    user_id: String,
    #[serde(default)]
    user_name: String,
}

#[derive(Deserialize)]
struct AcquireScriptReply {
    #[serde(default)]
    ok: bool,
    conflict: Option<ScriptConflict>,
}

#[derive(Deserialize)]
struct ReleaseScriptReply {
    #[serde(default)]
    released: Vec<String>,
}

/// Advisory lock engine over the key-value store.
pub struct LockService {
    store: Arc<dyn KeyValueStore>,
}

impl LockService {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Acquire (or same-owner refresh) every file in the request, or none.
    pub async fn acquire(&self, request: &AcquireRequest) -> Result<AcquireOutcome, LockError> {
        if request.user_id.is_empty() {
            return Err(LockError::Invalid("user_id must not be empty".into()));
        }
        if request.message.trim().is_empty() {
            return Err(LockError::Invalid("message must not be empty".into()));
        }
        let paths = dedup_paths(&request.file_paths);
        if paths.is_empty() {
            return Err(LockError::Invalid("file_paths must not be empty".into()));
        }

        let now = Utc::now().timestamp_millis();
        let entries: Vec<LockEntry> = paths
            .iter()
            .map(|path| LockEntry {
                file_path: path.clone(),
                user_id: request.user_id.clone(),
                user_name: request.user_name.clone(),
                status: request.status,
                agent_head: request.agent_head.clone(),
                message: request.message.clone(),
                timestamp: now,
                expiry: now + LOCK_TTL_MS,
            })
            .collect();

        let mut args = Vec::with_capacity(3 + paths.len() * 2);
        args.push(now.to_string());
        args.push(request.user_id.clone());
        args.push(paths.len().to_string());
        args.extend(paths.iter().cloned());
        for entry in &entries {
            args.push(serde_json::to_string(entry).map_err(|e| {
                LockError::InvalidResponse(format!("entry serialization: {e}"))
            })?);
        }

        let key = request.repo.lock_key(&request.branch);
        let raw = self.store.eval(&ACQUIRE_SCRIPT, &[key], &args).await?;
        let reply: AcquireScriptReply = serde_json::from_str(&raw)
            .map_err(|e| LockError::InvalidResponse(format!("{e}: {raw}")))?;

        if let Some(conflict) = reply.conflict {
            debug!(
                repo = %request.repo,
                branch = %request.branch,
                file = %conflict.file_path,
                holder = %conflict.user_id,
                "acquire rejected on conflict"
            );
            return Ok(AcquireOutcome::Conflict {
                file_path: conflict.file_path,
                user_id: conflict.user_id,
                user_name: conflict.user_name,
            });
        }
        if !reply.ok {
            return Err(LockError::InvalidResponse(raw));
        }
        debug!(
            repo = %request.repo,
            branch = %request.branch,
            files = entries.len(),
            user = %request.user_id,
            "locks acquired"
        );
        Ok(AcquireOutcome::Acquired(entries))
    }

    /// Delete the caller's locks on the given paths. Locks held by anyone
    /// else are left untouched. Returns the paths actually released.
    pub async fn release(
        &self,
        repo: &RepoRef,
        branch: &str,
        file_paths: &[String],
        user_id: &str,
    ) -> Result<Vec<String>, LockError> {
        let paths = dedup_paths(file_paths);
        if paths.is_empty() {
            return Err(LockError::Invalid("file_paths must not be empty".into()));
        }
        let mut args = Vec::with_capacity(1 + paths.len());
        args.push(user_id.to_string());
        args.extend(paths);

        let key = repo.lock_key(branch);
        let raw = self.store.eval(&RELEASE_SCRIPT, &[key], &args).await?;
        let reply: ReleaseScriptReply = serde_json::from_str(&raw)
            .map_err(|e| LockError::InvalidResponse(format!("{e}: {raw}")))?;
        Ok(reply.released)
    }

    /// Every live lock on `(repo, branch)`.
    pub async fn get_all(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<HashMap<String, LockEntry>, LockError> {
        let raw = self.store.hash_get_all(&repo.lock_key(branch)).await?;
        Ok(parse_live_entries(raw))
    }

    /// Live locks restricted to the requested paths.
    pub async fn check(
        &self,
        repo: &RepoRef,
        branch: &str,
        file_paths: &[String],
    ) -> Result<HashMap<String, LockEntry>, LockError> {
        let fields = dedup_paths(file_paths);
        let raw = self.store.hash_get(&repo.lock_key(branch), &fields).await?;
        Ok(parse_live_entries(raw))
    }

    /// Walk every lock hash and delete expired entries. Returns how many
    /// entries were removed.
    pub async fn sweep(&self) -> Result<u64, LockError> {
        let now = Utc::now().timestamp_millis();
        let keys = self.store.keys_with_prefix(LOCK_KEY_PREFIX).await?;
        let mut cleaned: u64 = 0;
        for key in keys {
            let raw = self.store.hash_get_all(&key).await?;
            let expired: Vec<String> = raw
                .iter()
                .filter(|(_, value)| match serde_json::from_str::<LockEntry>(value) {
                    Ok(entry) => entry.is_expired(now),
                    // unparseable entries are semantically absent; reap them
                    Err(_) => true,
                })
                .map(|(field, _)| field.clone())
                .collect();
            if expired.is_empty() {
                continue;
            }
            self.store.hash_delete(&key, &expired).await?;
            cleaned += expired.len() as u64;
        }
        if cleaned > 0 {
            debug!(cleaned, "sweep removed expired locks");
        }
        Ok(cleaned)
    }

    /// Administrative wipe of every lock on `(repo, branch)`. Returns the
    /// number of entries that were present.
    pub async fn release_all(&self, repo: &RepoRef, branch: &str) -> Result<u64, LockError> {
        let key = repo.lock_key(branch);
        let existing = self.store.hash_get_all(&key).await?;
        self.store.delete(&key).await?;
        Ok(existing.len() as u64)
    }
}

fn dedup_paths(paths: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    paths
        .iter()
        .filter(|p| !p.trim().is_empty())
        .filter(|p| seen.insert(p.as_str()))
        .cloned()
        .collect()
}

fn parse_live_entries(raw: HashMap<String, String>) -> HashMap<String, LockEntry> {
    let now = Utc::now().timestamp_millis();
    raw.into_iter()
        .filter_map(|(path, value)| match serde_json::from_str::<LockEntry>(&value) {
            Ok(entry) if !entry.is_expired(now) => Some((path, entry)),
            Ok(_) => None,
            Err(e) => {
                warn!(%path, error = %e, "dropping malformed lock entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lock::LockStatus;

    fn entry(user: &str, expiry: i64) -> String {
        serde_json::to_string(&LockEntry {
            file_path: "src/a.ts".into(),
            user_id: user.into(),
            user_name: user.into(),
            status: LockStatus::Writing,
            agent_head: "h1".into(),
            message: "m".into(),
            timestamp: 0,
            expiry,
        })
        .unwrap()
    }

    #[test]
    fn parse_live_entries_filters_expired_and_malformed() {
        let now = Utc::now().timestamp_millis();
        let mut raw = HashMap::new();
        raw.insert("live.ts".to_string(), entry("alice", now + 10_000));
        raw.insert("dead.ts".to_string(), entry("bob", now - 1));
        raw.insert("junk.ts".to_string(), "{not json".to_string());
        let live = parse_live_entries(raw);
        assert_eq!(live.len(), 1);
        assert_eq!(live["live.ts"].user_id, "alice");
    }

    #[test]
    fn dedup_preserves_order_and_drops_blanks() {
        let paths = vec![
            "a.ts".to_string(),
            "b.ts".to_string(),
            "a.ts".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(dedup_paths(&paths), vec!["a.ts", "b.ts"]);
    }
}
