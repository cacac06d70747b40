// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Raw atomic counters and gauges for a single lock manager.
//!
//! All increment/decrement methods use `Ordering::Relaxed` for zero overhead on the hot path.
//! The [`MetricsAggregator`](super::MetricsAggregator) reads these atomics at scrape time and
//! builds Prometheus protos.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Raw atomic metrics for one `BlockInfoManager`.
///
/// Counters are monotonically increasing `AtomicU64`.
/// Gauges are bidirectional `AtomicI64`.
pub struct LockMetrics {
    manager_label: String,

    // Counters (monotonic)
    read_locks: AtomicU64,
    write_locks: AtomicU64,
    lock_waits: AtomicU64,
    new_blocks: AtomicU64,
    write_races_lost: AtomicU64,
    unlocks: AtomicU64,
    blocks_removed: AtomicU64,
    tasks_released: AtomicU64,

    // Gauges (bidirectional)
    blocks_tracked: AtomicI64,
    registered_tasks: AtomicI64,
}

impl LockMetrics {
    /// Create a new `LockMetrics` with the given manager label (typically the
    /// short name of the block key type).
    pub fn new(manager_label: String) -> Self {
        Self {
            manager_label,
            read_locks: AtomicU64::new(0),
            write_locks: AtomicU64::new(0),
            lock_waits: AtomicU64::new(0),
            new_blocks: AtomicU64::new(0),
            write_races_lost: AtomicU64::new(0),
            unlocks: AtomicU64::new(0),
            blocks_removed: AtomicU64::new(0),
            tasks_released: AtomicU64::new(0),
            blocks_tracked: AtomicI64::new(0),
            registered_tasks: AtomicI64::new(0),
        }
    }

    /// The label distinguishing this manager in exported metrics.
    #[inline(always)]
    pub fn manager_label(&self) -> &str {
        &self.manager_label
    }

    // ---- Counter increments ----

    #[inline(always)]
    pub fn inc_read_locks(&self) {
        self.read_locks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_write_locks(&self) {
        self.write_locks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_lock_waits(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_new_blocks(&self) {
        self.new_blocks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_write_races_lost(&self) {
        self.write_races_lost.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_unlocks(&self) {
        self.unlocks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_blocks_removed(&self) {
        self.blocks_removed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_tasks_released(&self) {
        self.tasks_released.fetch_add(1, Ordering::Relaxed);
    }

    // ---- Gauge operations ----

    #[inline(always)]
    pub fn set_blocks_tracked(&self, count: i64) {
        self.blocks_tracked.store(count, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_blocks_tracked(&self) {
        self.blocks_tracked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn dec_blocks_tracked(&self) {
        self.blocks_tracked.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn set_registered_tasks(&self, count: i64) {
        self.registered_tasks.store(count, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_registered_tasks(&self) {
        self.registered_tasks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn dec_registered_tasks(&self) {
        self.registered_tasks.fetch_sub(1, Ordering::Relaxed);
    }

    // ---- Snapshot ----

    /// Take a point-in-time snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            read_locks: self.read_locks.load(Ordering::Relaxed),
            write_locks: self.write_locks.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
            new_blocks: self.new_blocks.load(Ordering::Relaxed),
            write_races_lost: self.write_races_lost.load(Ordering::Relaxed),
            unlocks: self.unlocks.load(Ordering::Relaxed),
            blocks_removed: self.blocks_removed.load(Ordering::Relaxed),
            tasks_released: self.tasks_released.load(Ordering::Relaxed),
            blocks_tracked: self.blocks_tracked.load(Ordering::Relaxed),
            registered_tasks: self.registered_tasks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of all atomic metrics, used by the prometheus collector and tests.
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub read_locks: u64,
    pub write_locks: u64,
    pub lock_waits: u64,
    pub new_blocks: u64,
    pub write_races_lost: u64,
    pub unlocks: u64,
    pub blocks_removed: u64,
    pub tasks_released: u64,
    pub blocks_tracked: i64,
    pub registered_tasks: i64,
}
