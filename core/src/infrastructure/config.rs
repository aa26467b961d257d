// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Service configuration, environment-only.
//
// Remote credentials, store credentials and the sweeper secret are
// injected through the environment; nothing else is required.

use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7400;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub redis_url: String,
    pub github_api_url: String,
    /// Unauthenticated requests degrade to GitHub's anonymous quota.
    pub github_token: Option<String>,
    /// Shared secret for the cleanup endpoint. With none configured the
    /// endpoint always rejects.
    pub sweeper_secret: Option<String>,
    pub host: String,
    pub port: u16,
    pub sweep_interval: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("CONCORD_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid CONCORD_PORT: {raw}"))?,
            Err(_) => DEFAULT_PORT,
        };
        let sweep_interval_secs = match std::env::var("CONCORD_SWEEP_INTERVAL_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("invalid CONCORD_SWEEP_INTERVAL_SECS: {raw}"))?,
            Err(_) => DEFAULT_SWEEP_INTERVAL_SECS,
        };

        Ok(Self {
            redis_url: env_or("CONCORD_REDIS_URL", DEFAULT_REDIS_URL),
            github_api_url: env_or("GITHUB_API_URL", DEFAULT_GITHUB_API_URL),
            github_token: non_empty_env("GITHUB_TOKEN"),
            sweeper_secret: non_empty_env("CONCORD_SWEEPER_SECRET"),
            host: env_or("CONCORD_HOST", DEFAULT_HOST),
            port,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            github_token: None,
            sweeper_secret: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
