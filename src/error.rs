// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Error types for lock and registry operations.

use crate::{BlockKey, TaskAttemptId};

/// Error returned by fallible [`BlockInfoManager`](crate::BlockInfoManager)
/// operations.
///
/// Every variant carries the offending key or task id back to the caller.
/// Bookkeeping violations (negative counts, reader/writer coexistence,
/// over-release) are *not* represented here: they indicate a broken locking
/// protocol and panic instead.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LockError<K: BlockKey> {
    /// `register_task` was called twice for the same task attempt.
    #[error("task attempt {task} is already registered")]
    AlreadyRegistered { task: TaskAttemptId },

    /// The referenced block is not tracked by the manager.
    #[error("block {block:?} does not exist")]
    BlockNotFound { block: K },

    /// A write-protected operation was invoked by a task that does not hold
    /// the block's write lock.
    #[error("task attempt {task} does not hold the write lock on block {block:?}")]
    NotOwned { block: K, task: TaskAttemptId },
}
