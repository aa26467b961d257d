// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod graph;
pub mod locks;
pub mod serve;
pub mod status;

pub use graph::GraphCommand;
pub use locks::LocksCommand;
pub use status::StatusCommand;
