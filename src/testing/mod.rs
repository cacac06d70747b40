// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Shared test fixtures for lock-manager tests.
//!
//! Consolidates the key/level types and helpers used across the unit,
//! scenario, and property tests. Exported behind the `testing` feature so
//! downstream crates can drive a manager in their own tests.

use crate::context::TaskContext;
use crate::info::{BlockInfo, ClassTag};
use crate::manager::BlockInfoManager;
use crate::TaskAttemptId;

/// Canonical block key type used across tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestBlockId(pub &'static str);

/// Canonical storage level used across tests. Carried, never interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestLevel {
    Memory,
    Disk,
}

/// Manager type used across tests.
pub type TestManager = BlockInfoManager<TestBlockId, TestLevel>;

/// Shorthand for a test block key.
pub fn block(name: &'static str) -> TestBlockId {
    TestBlockId(name)
}

/// A fresh in-memory metadata record for a byte-vector block.
pub fn new_test_info() -> BlockInfo<TestLevel> {
    BlockInfo::new(TestLevel::Memory, ClassTag::of::<Vec<u8>>(), false)
}

/// A manager with default metrics.
pub fn create_test_manager() -> TestManager {
    BlockInfoManager::new()
}

/// Run `f` with `task` installed as the current thread's task attempt id.
pub fn with_task<R>(task: TaskAttemptId, f: impl FnOnce() -> R) -> R {
    let _ctx = TaskContext::enter(task);
    f()
}
