// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Readers-writer lock protocol with task-scoped ownership.
//!
//! [`BlockInfoManager`] owns the block metadata table and the two per-task
//! holdings maps, and keeps the three mutually consistent under concurrent
//! task activity. Every public operation runs inside a single manager-wide
//! mutex; blocking acquisitions suspend on one condition variable and retest
//! after every broadcast. Critical sections are short, do no I/O, and call
//! no user code, so the coarse guard is cheap.
//!
//! Lock ownership is attributed to the ambient task attempt id of the calling
//! thread (see [`crate::context`]). Read locks are re-entrant per task (each
//! acquisition bumps the multiplicity); write locks are exclusive and not
//! re-entrant: a task that needs to prove it already holds the write lock
//! calls [`assert_block_is_locked_for_writing`](BlockInfoManager::assert_block_is_locked_for_writing)
//! instead of acquiring again.
//!
//! No fairness is promised among waiters: whichever waiter reacquires the
//! guard first after a broadcast and finds its predicate satisfied wins.
//! Callers needing fairness must layer it above.

mod builder;

#[cfg(test)]
mod lock_proptest;

pub use builder::BlockInfoManagerBuilder;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::context;
use crate::error::LockError;
use crate::info::BlockInfo;
use crate::metrics::LockMetrics;
use crate::{BlockKey, NO_WRITER, NON_TASK_WRITER, StorageLevel, TaskAttemptId};

/// Block metadata table plus the readers-writer locking protocol.
///
/// Thread-safe: all state lives behind one internal [`Mutex`]; returned
/// `Arc<BlockInfo>` handles stay valid after the guard is released and
/// observe later mutations.
///
/// Construct via [`BlockInfoManager::new`] or, for metrics wiring, via
/// [`BlockInfoManager::builder`].
pub struct BlockInfoManager<K: BlockKey, L: StorageLevel> {
    state: Mutex<State<K, L>>,
    lock_released: Condvar,
    metrics: Arc<LockMetrics>,
}

struct State<K: BlockKey, L> {
    /// Metadata for every block tracked by the store.
    infos: HashMap<K, Arc<BlockInfo<L>>>,
    /// Read multiset per registered task attempt: block -> acquisition count.
    /// A task's row exists from `register_task` until its bulk release, so
    /// this map doubles as the task registry.
    read_holdings: HashMap<TaskAttemptId, HashMap<K, usize>>,
    /// Blocks write-locked per task attempt. Rows are created lazily on
    /// first write acquisition and dropped when they empty out.
    write_holdings: HashMap<TaskAttemptId, HashSet<K>>,
}

impl<K: BlockKey, L> State<K, L> {
    fn register(&mut self, task: TaskAttemptId) -> Result<(), LockError<K>> {
        match self.read_holdings.entry(task) {
            Entry::Occupied(_) => Err(LockError::AlreadyRegistered { task }),
            Entry::Vacant(row) => {
                row.insert(HashMap::new());
                Ok(())
            }
        }
    }

    fn assert_registered(&self, task: TaskAttemptId) {
        assert!(
            self.read_holdings.contains_key(&task),
            "task attempt {task} used the lock manager before registering"
        );
    }

    fn reads_for(&mut self, task: TaskAttemptId) -> &mut HashMap<K, usize> {
        self.read_holdings
            .get_mut(&task)
            .unwrap_or_else(|| panic!("task attempt {task} is not registered"))
    }

    fn drop_write_binding(&mut self, task: TaskAttemptId, block: &K) {
        if let Some(held) = self.write_holdings.get_mut(&task) {
            held.remove(block);
            if held.is_empty() {
                self.write_holdings.remove(&task);
            }
        }
    }
}

impl<K: BlockKey, L: StorageLevel> BlockInfoManager<K, L> {
    /// Create a manager with default (unexported) metrics.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new builder for a `BlockInfoManager`.
    pub fn builder() -> BlockInfoManagerBuilder<K, L> {
        BlockInfoManagerBuilder::new()
    }

    pub(crate) fn with_metrics(metrics: Arc<LockMetrics>) -> Self {
        let mut state = State {
            infos: HashMap::new(),
            read_holdings: HashMap::new(),
            write_holdings: HashMap::new(),
        };
        state
            .register(NON_TASK_WRITER)
            .expect("fresh registry cannot have entries");
        metrics.set_registered_tasks(1);
        Self {
            state: Mutex::new(state),
            lock_released: Condvar::new(),
            metrics,
        }
    }

    /// Reference to this manager's metrics.
    pub fn metrics(&self) -> &Arc<LockMetrics> {
        &self.metrics
    }

    /// Register a task attempt with the manager.
    ///
    /// Must be called once per task attempt before that attempt's first lock
    /// operation. Returns [`LockError::AlreadyRegistered`] on a duplicate id.
    pub fn register_task(&self, task: TaskAttemptId) -> Result<(), LockError<K>> {
        self.state.lock().register(task)?;
        self.metrics.inc_registered_tasks();
        tracing::trace!(task, "registered task attempt");
        Ok(())
    }

    /// Acquire a read lock on `block` for the calling task.
    ///
    /// Returns `None` if the block does not exist, or if it is write-locked
    /// and `blocking` is false. With `blocking` set, waits until the writer
    /// releases. Re-entrant: each successful call adds one read reference
    /// that must be paired with its own [`unlock`](Self::unlock).
    pub fn lock_for_reading(&self, block: &K, blocking: bool) -> Option<Arc<BlockInfo<L>>> {
        let task = context::current_task_attempt_id();
        tracing::trace!(?block, task, "acquiring read lock");
        let mut state = self.state.lock();
        state.assert_registered(task);
        let mut waited = false;
        loop {
            let info = state.infos.get(block).cloned()?;
            if info.writer_task() == NO_WRITER {
                *state.reads_for(task).entry(block.clone()).or_insert(0) += 1;
                info.add_reader();
                self.metrics.inc_read_locks();
                tracing::trace!(?block, task, readers = info.reader_count(), "read lock acquired");
                return Some(info);
            }
            if !blocking {
                return None;
            }
            if !waited {
                self.metrics.inc_lock_waits();
                waited = true;
            }
            self.lock_released.wait(&mut state);
        }
    }

    /// Acquire the write lock on `block` for the calling task.
    ///
    /// Returns `None` if the block does not exist, or if it has a writer or
    /// readers and `blocking` is false. With `blocking` set, waits until the
    /// block is fully unlocked. Not re-entrant: a task already holding the
    /// write lock must not acquire it again.
    pub fn lock_for_writing(&self, block: &K, blocking: bool) -> Option<Arc<BlockInfo<L>>> {
        let task = context::current_task_attempt_id();
        tracing::trace!(?block, task, "acquiring write lock");
        let mut state = self.state.lock();
        state.assert_registered(task);
        let mut waited = false;
        loop {
            let info = state.infos.get(block).cloned()?;
            if info.writer_task() == NO_WRITER && info.reader_count() == 0 {
                info.set_writer_task(task);
                state.write_holdings.entry(task).or_default().insert(block.clone());
                self.metrics.inc_write_locks();
                tracing::trace!(?block, task, "write lock acquired");
                return Some(info);
            }
            if !blocking {
                return None;
            }
            if !waited {
                self.metrics.inc_lock_waits();
                waited = true;
            }
            self.lock_released.wait(&mut state);
        }
    }

    /// Install metadata for a block that may not exist yet, racing against
    /// other creators. First writer wins.
    ///
    /// Returns `true` if the calling task installed `new_info` and now holds
    /// the write lock on `block`. Returns `false` if another task created
    /// the block first; `new_info` is discarded and the caller instead holds
    /// a read lock on the existing block, waiting out its writer if needed,
    /// which is exactly what a compute-then-cache path wants.
    pub fn lock_new_block_for_writing(&self, block: K, new_info: BlockInfo<L>) -> bool {
        let task = context::current_task_attempt_id();
        tracing::trace!(?block, task, "acquiring write lock for new block");
        let mut state = self.state.lock();
        state.assert_registered(task);
        let mut waited = false;
        loop {
            match state.infos.get(&block).cloned() {
                Some(info) => {
                    if info.writer_task() == NO_WRITER {
                        *state.reads_for(task).entry(block.clone()).or_insert(0) += 1;
                        info.add_reader();
                        self.metrics.inc_read_locks();
                        self.metrics.inc_write_races_lost();
                        tracing::trace!(?block, task, "lost new-block race, holding read lock");
                        return false;
                    }
                    if !waited {
                        self.metrics.inc_lock_waits();
                        waited = true;
                    }
                    self.lock_released.wait(&mut state);
                }
                None => {
                    // A just-inserted block can have no readers or writer, so
                    // the write lock is granted without waiting.
                    let info = Arc::new(new_info);
                    state.infos.insert(block.clone(), Arc::clone(&info));
                    info.set_writer_task(task);
                    state.write_holdings.entry(task).or_default().insert(block);
                    self.metrics.inc_blocks_tracked();
                    self.metrics.inc_new_blocks();
                    self.metrics.inc_write_locks();
                    tracing::trace!(task, "installed new block, write lock acquired");
                    return true;
                }
            }
        }
    }

    /// Release one lock held on `block` by the calling task: the write lock
    /// if a writer is present, otherwise one read reference.
    ///
    /// Callers release only locks they hold.
    pub fn unlock(&self, block: &K) -> Result<(), LockError<K>> {
        self.unlock_for_task(block, context::current_task_attempt_id())
    }

    /// [`unlock`](Self::unlock) on behalf of an explicit task attempt.
    ///
    /// Used when a task's lock is released from a thread that is not running
    /// the task, e.g. a completion callback.
    pub fn unlock_for_task(&self, block: &K, task: TaskAttemptId) -> Result<(), LockError<K>> {
        tracing::trace!(?block, task, "releasing lock");
        let mut state = self.state.lock();
        let info = state
            .infos
            .get(block)
            .cloned()
            .ok_or_else(|| LockError::BlockNotFound {
                block: block.clone(),
            })?;
        if info.writer_task() != NO_WRITER {
            info.set_writer_task(NO_WRITER);
            state.drop_write_binding(task, block);
        } else {
            let reads = state.reads_for(task);
            let multiplicity = reads.get_mut(block).unwrap_or_else(|| {
                panic!("task attempt {task} does not hold a read lock on block {block:?}")
            });
            *multiplicity -= 1;
            if *multiplicity == 0 {
                reads.remove(block);
            }
            info.remove_reader();
        }
        self.metrics.inc_unlocks();
        self.lock_released.notify_all();
        Ok(())
    }

    /// Atomically swap the calling task's write lock on `block` for a single
    /// read reference, without letting any other task in between.
    ///
    /// Fails with [`LockError::NotOwned`] if the caller does not hold the
    /// write lock.
    pub fn downgrade_lock(&self, block: &K) -> Result<(), LockError<K>> {
        let task = context::current_task_attempt_id();
        tracing::trace!(?block, task, "downgrading write lock");
        let mut state = self.state.lock();
        let info = state
            .infos
            .get(block)
            .cloned()
            .ok_or_else(|| LockError::BlockNotFound {
                block: block.clone(),
            })?;
        if info.writer_task() != task {
            return Err(LockError::NotOwned {
                block: block.clone(),
                task,
            });
        }
        info.set_writer_task(NO_WRITER);
        state.drop_write_binding(task, block);
        *state.reads_for(task).entry(block.clone()).or_insert(0) += 1;
        info.add_reader();
        self.metrics.inc_unlocks();
        self.metrics.inc_read_locks();
        // Waiting readers can proceed alongside the downgraded holder.
        self.lock_released.notify_all();
        Ok(())
    }

    /// Affirmatively check that the calling task holds the write lock on
    /// `block`, returning the handle.
    pub fn assert_block_is_locked_for_writing(
        &self,
        block: &K,
    ) -> Result<Arc<BlockInfo<L>>, LockError<K>> {
        let task = context::current_task_attempt_id();
        let state = self.state.lock();
        let info = state
            .infos
            .get(block)
            .ok_or_else(|| LockError::BlockNotFound {
                block: block.clone(),
            })?;
        if info.writer_task() != task {
            return Err(LockError::NotOwned {
                block: block.clone(),
                task,
            });
        }
        Ok(Arc::clone(info))
    }

    /// Look up a block's metadata without touching any lock state.
    ///
    /// For read-only status queries; callers must not mutate lock fields
    /// through the returned handle.
    pub fn get(&self, block: &K) -> Option<Arc<BlockInfo<L>>> {
        self.state.lock().infos.get(block).cloned()
    }

    /// Unwind every lock still held by `task` and unregister it.
    ///
    /// Called by the task completion handler whether the task finished or
    /// failed, so no block stays pinned by a dead task. Returns the distinct
    /// blocks whose pin count changed; the surrounding store uses the list
    /// for eviction bookkeeping.
    pub fn release_all_locks_for_task(&self, task: TaskAttemptId) -> Vec<K> {
        tracing::debug!(task, "releasing all locks for task");
        let mut released = Vec::new();
        let mut state = self.state.lock();

        let read_locks = state.read_holdings.remove(&task);
        if read_locks.is_some() {
            self.metrics.dec_registered_tasks();
        }
        let write_locks = state.write_holdings.remove(&task).unwrap_or_default();

        for block in write_locks {
            if let Some(info) = state.infos.get(&block)
                && info.writer_task() == task
            {
                info.set_writer_task(NO_WRITER);
            }
            released.push(block);
        }
        for (block, multiplicity) in read_locks.unwrap_or_default() {
            if let Some(info) = state.infos.get(&block) {
                info.remove_readers(multiplicity);
            }
            released.push(block);
        }

        self.metrics.inc_tasks_released();
        self.lock_released.notify_all();
        tracing::debug!(task, released = released.len(), "task locks released");
        released
    }

    /// Delete `block` from the metadata table.
    ///
    /// The calling task must hold the write lock. Outstanding handles see a
    /// fully released record; waiters are woken and observe the block as
    /// absent.
    pub fn remove_block(&self, block: &K) -> Result<(), LockError<K>> {
        let task = context::current_task_attempt_id();
        tracing::trace!(?block, task, "removing block");
        let mut state = self.state.lock();
        let info = state
            .infos
            .get(block)
            .cloned()
            .ok_or_else(|| LockError::BlockNotFound {
                block: block.clone(),
            })?;
        if info.writer_task() != task {
            return Err(LockError::NotOwned {
                block: block.clone(),
                task,
            });
        }
        state.infos.remove(block);
        info.set_reader_count(0);
        info.set_writer_task(NO_WRITER);
        state.drop_write_binding(task, block);
        self.metrics.inc_blocks_removed();
        self.metrics.dec_blocks_tracked();
        self.lock_released.notify_all();
        Ok(())
    }

    /// Drop every block and every task registration. Used at shutdown.
    ///
    /// Outstanding handles see fully released records. The non-task writer
    /// is re-registered afterwards, so driver threads can keep using the
    /// manager across a clear.
    pub fn clear(&self) {
        tracing::debug!("clearing all block and task state");
        let mut state = self.state.lock();
        for info in state.infos.values() {
            info.set_reader_count(0);
            info.set_writer_task(NO_WRITER);
        }
        state.infos.clear();
        state.read_holdings.clear();
        state.write_holdings.clear();
        state
            .register(NON_TASK_WRITER)
            .expect("registry was just cleared");
        self.metrics.set_blocks_tracked(0);
        self.metrics.set_registered_tasks(1);
        self.lock_released.notify_all();
    }

    // ---- Diagnostic accessors ----

    /// Number of blocks currently tracked.
    pub fn size(&self) -> usize {
        self.state.lock().infos.len()
    }

    /// Snapshot of every tracked block and its metadata handle.
    ///
    /// The handles are shared with the manager and may mutate after the
    /// snapshot is taken; consumers must treat them as live.
    pub fn entries(&self) -> Vec<(K, Arc<BlockInfo<L>>)> {
        self.state
            .lock()
            .infos
            .iter()
            .map(|(block, info)| (block.clone(), Arc::clone(info)))
            .collect()
    }

    /// Total entry count across the metadata table and both holdings maps,
    /// counting read references with multiplicity. Leak-detection aid.
    pub fn get_number_of_map_entries(&self) -> u64 {
        let state = self.state.lock();
        let read_entries: usize = state
            .read_holdings
            .values()
            .map(|reads| reads.values().sum::<usize>())
            .sum();
        let write_entries: usize = state.write_holdings.values().map(HashSet::len).sum();
        (state.infos.len()
            + state.read_holdings.len()
            + read_entries
            + state.write_holdings.len()
            + write_entries) as u64
    }

    /// Total locks held by `task`: read references (with multiplicity) plus
    /// write locks.
    pub fn lock_count_for_task(&self, task: TaskAttemptId) -> usize {
        let state = self.state.lock();
        let reads: usize = state
            .read_holdings
            .get(&task)
            .map(|reads| reads.values().sum())
            .unwrap_or(0);
        let writes = state.write_holdings.get(&task).map(HashSet::len).unwrap_or(0);
        reads + writes
    }

    /// Number of registered task attempts, the non-task writer included.
    pub fn registered_task_count(&self) -> usize {
        self.state.lock().read_holdings.len()
    }

    /// Assert the cross-map bookkeeping invariants over the whole state:
    /// reader counts match holdings multiplicity, writers match holdings
    /// sets, held blocks exist, the non-task writer is registered.
    #[cfg(any(test, feature = "testing"))]
    pub fn check_consistency(&self) {
        let state = self.state.lock();

        let mut totals: HashMap<K, usize> = HashMap::new();
        for reads in state.read_holdings.values() {
            for (block, multiplicity) in reads {
                assert!(
                    *multiplicity > 0,
                    "zero-multiplicity read holding for block {block:?}"
                );
                *totals.entry(block.clone()).or_insert(0) += multiplicity;
            }
        }

        for (block, info) in &state.infos {
            let expected = totals.get(block).copied().unwrap_or(0);
            assert_eq!(
                info.reader_count(),
                expected,
                "reader count mismatch for block {block:?}"
            );
            let writer = info.writer_task();
            if writer != NO_WRITER {
                assert_eq!(
                    info.reader_count(),
                    0,
                    "block {block:?} has readers while write-locked by task {writer}"
                );
                assert!(
                    state
                        .write_holdings
                        .get(&writer)
                        .is_some_and(|held| held.contains(block)),
                    "writer task {writer} of block {block:?} has no matching write holding"
                );
            }
        }

        for (task, held) in &state.write_holdings {
            for block in held {
                let info = state
                    .infos
                    .get(block)
                    .unwrap_or_else(|| panic!("write holding for untracked block {block:?}"));
                assert_eq!(
                    info.writer_task(),
                    *task,
                    "write holding for block {block:?} does not match its writer"
                );
            }
        }

        for block in totals.keys() {
            assert!(
                state.infos.contains_key(block),
                "read holding for untracked block {block:?}"
            );
        }

        assert!(
            state.read_holdings.contains_key(&NON_TASK_WRITER),
            "the non-task writer must stay registered"
        );
    }
}

impl<K: BlockKey, L: StorageLevel> Default for BlockInfoManager<K, L> {
    fn default() -> Self {
        Self::new()
    }
}
