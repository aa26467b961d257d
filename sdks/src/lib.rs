// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

/// Concord Rust SDK
///
/// Coordinate concurrent coding agents through the Concord service.

pub mod client;

pub use client::{CheckStatusArgs, ConcordClient, PostStatusArgs, SweepReport};
pub use concord_core::application::coordination::{PostStatusOutcome, StatusReport};
pub use concord_core::domain::graph::DependencyGraph;
pub use concord_core::domain::lock::LockEntry;
pub use concord_core::domain::orchestration::{Orchestration, OrchestrationAction};
