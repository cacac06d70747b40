// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Block metadata and lock management for a shared block store.
//!
//! This crate provides the metadata and locking core of a block store that is
//! shared by many concurrently running tasks:
//! - Per-block metadata records ([`BlockInfo`]) with loudly-checked invariants
//! - A readers-writer locking protocol with task-scoped ownership
//! - First-writer-wins resolution for blocks that do not exist yet
//! - Bulk release of every lock a finished or failed task still holds
//!
//! # Locking model
//!
//! Each block is in one of the following states, driven by the
//! [`BlockInfoManager`] operations:
//!
//! ```text
//!           lock_new_block_for_writing (winner)
//!   Absent ────────────────────────────────────► WriteLocked(t)
//!     ▲                                            │        │
//!     │ remove_block / clear              unlock   │        │ downgrade_lock
//!     │                                            ▼        ▼
//!     │                lock_for_writing                        lock_for_reading
//!     └──────────  Unlocked ◄─────────────────► ReadLocked(n) ◄──────────────┐
//!                     │          unlock (n=1)         │                      │
//!                     └───────────────────────────────┴──────────────────────┘
//!                                                        unlock (n>1)
//! ```
//!
//! Many tasks may read a block concurrently and a single task may take the
//! read lock on the same block several times; write locks are exclusive and
//! not re-entrant. The first task to install a new block's metadata wins the
//! write lock; later racers wait for the winner and degrade to readers of the
//! winner's block.
//!
//! All lock operations attribute ownership to the ambient task attempt id of
//! the calling thread (see [`context`]); threads without an installed id act
//! as the reserved [`NON_TASK_WRITER`].

pub mod context;
pub mod error;
pub mod info;
pub mod manager;
pub mod metrics;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use context::TaskContext;
pub use error::LockError;
pub use info::{BlockInfo, ClassTag};
pub use manager::{BlockInfoManager, BlockInfoManagerBuilder};
pub use metrics::{LockMetrics, MetricsAggregator};

/// One execution attempt of a task; the lock-owning principal.
///
/// Real task attempt ids are non-negative. The negative range is reserved for
/// the [`NO_WRITER`] and [`NON_TASK_WRITER`] sentinels.
pub type TaskAttemptId = i64;

/// Sentinel marking a block with no writer. Never a valid task attempt id.
pub const NO_WRITER: TaskAttemptId = -1;

/// Task attempt id attributed to threads that are not running a task
/// (driver threads, setup, shutdown, tests). Always registered.
pub const NON_TASK_WRITER: TaskAttemptId = -1024;

/// Marker trait for block identifiers.
///
/// A blanket implementation covers every type that is
/// `Clone + Eq + Hash + Debug + Send + Sync + 'static`; block ids are
/// supplied by callers and never synthesized or interpreted here.
pub trait BlockKey:
    Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static
{
}
impl<T: Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static> BlockKey for T {}

/// Marker trait for storage level descriptors.
///
/// Carried in [`BlockInfo`] on behalf of the surrounding store, never
/// interpreted. Blanket-implemented for any ordinary data type.
pub trait StorageLevel: Clone + std::fmt::Debug + Send + Sync + 'static {}
impl<T: Clone + std::fmt::Debug + Send + Sync + 'static> StorageLevel for T {}
