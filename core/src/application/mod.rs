// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod coordination;
pub mod graph;
pub mod imports;
pub mod locks;
pub mod sweeper;
