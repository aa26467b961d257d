// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service entrypoint: wires the Redis store, the GitHub adapter and the
//! coordination services into the HTTP API, and spawns the periodic
//! stale-lock sweeper alongside it.

use anyhow::{Context, Result};
use concord_core::application::coordination::CoordinationService;
use concord_core::application::graph::GraphService;
use concord_core::application::locks::LockService;
use concord_core::application::sweeper::StaleLockSweeper;
use concord_core::infrastructure::config::ServiceConfig;
use concord_core::infrastructure::event_bus::EventBus;
use concord_core::infrastructure::github::GitHubClient;
use concord_core::infrastructure::redis_store::RedisStore;
use concord_core::presentation::api::{app, AppState};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

pub async fn run(host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = ServiceConfig::from_env().context("Failed to load configuration")?;
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if config.sweeper_secret.is_none() {
        warn!("CONCORD_SWEEPER_SECRET is not set; the cleanup endpoint will reject every call");
    }
    if config.github_token.is_none() {
        warn!("GITHUB_TOKEN is not set; remote requests run on the anonymous quota");
    }

    let store = Arc::new(
        RedisStore::new(&config.redis_url)
            .with_context(|| format!("Failed to open store at {}", config.redis_url))?,
    );
    let remote = Arc::new(GitHubClient::new(
        config.github_api_url.clone(),
        config.github_token.clone(),
    ));

    let locks = Arc::new(LockService::new(store.clone()));
    let graph = Arc::new(GraphService::new(store.clone(), remote.clone()));
    let events = Arc::new(EventBus::with_default_capacity());
    let coordination = Arc::new(CoordinationService::new(
        locks.clone(),
        graph,
        remote,
        events.clone(),
    ));

    let sweeper = StaleLockSweeper::new(locks.clone(), config.sweep_interval);
    tokio::spawn(sweeper.run());

    let state = Arc::new(AppState {
        coordination,
        locks,
        events,
        sweeper_secret: config.sweeper_secret.clone(),
        start_time: Instant::now(),
    });

    let bind = config.bind_address();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!(address = %bind, "concord listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("concord stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
