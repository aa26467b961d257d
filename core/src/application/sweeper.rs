// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Stale-Lock Sweeper
//
// Bounds lock lifetime independent of caller cooperation: expired entries
// are already invisible to readers, this task physically deletes them on
// a wall-clock schedule.

use crate::application::locks::LockService;
use crate::domain::lock::LockError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct StaleLockSweeper {
    locks: Arc<LockService>,
    interval: Duration,
}

impl StaleLockSweeper {
    pub fn new(locks: Arc<LockService>, interval: Duration) -> Self {
        Self { locks, interval }
    }

    /// One sweep pass; returns the number of entries removed.
    pub async fn sweep_once(&self) -> Result<u64, LockError> {
        self.locks.sweep().await
    }

    /// Run forever on the configured interval. Spawn as a background task;
    /// a failed pass is logged and retried on the next tick.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "stale-lock sweeper started");
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => debug!("sweep pass found nothing to clean"),
                Ok(cleaned) => info!(cleaned, "sweep pass removed expired locks"),
                Err(e) => warn!(error = %e, "sweep pass failed"),
            }
        }
    }
}
