// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Concord core
//!
//! Coordination service for multiple AI coding agents working on a shared
//! Git repository: advisory file locks, staleness checks against the
//! remote branch head, and a cached file-import dependency graph.
//!
//! # Architecture
//!
//! - **domain** — entities, ports, errors
//! - **application** — lock engine, graph builder, coordination, sweeper
//! - **infrastructure** — Redis store, GitHub adapter, event bus, config
//! - **presentation** — HTTP API

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
