// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-block metadata records.
//!
//! A [`BlockInfo`] tracks one block's storage level, value type, size, and
//! lock state. The lock fields (`reader_count`, `writer_task`) are only ever
//! written while the owning [`BlockInfoManager`](crate::BlockInfoManager)
//! holds its guard; they are stored in relaxed atomics so that outstanding
//! `Arc<BlockInfo>` handles observe mutations made after they were handed
//! out. The guard is the serialization point; the atomics provide
//! visibility, not synchronization.
//!
//! Every mutation of the lock fields re-asserts the reader/writer exclusion
//! invariants. A violation is a programming error in the locking protocol and
//! panics immediately rather than limping on with corrupt bookkeeping.

use std::any::TypeId;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

use crate::metrics::short_type_name;
use crate::{NO_WRITER, StorageLevel, TaskAttemptId};

/// Identifies the Rust type a block's bytes deserialize to.
///
/// Compared only by [`TypeId`]; the short type name rides along for
/// diagnostics and log output.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassTag {
    id: TypeId,
    name: &'static str,
}

impl ClassTag {
    /// The tag for values of type `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: short_type_name::<T>(),
        }
    }

    /// Short (unqualified) name of the tagged type.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for ClassTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ClassTag").field(&self.name).finish()
    }
}

/// Mutable metadata for a single block.
///
/// Created by callers and handed to
/// [`lock_new_block_for_writing`](crate::BlockInfoManager::lock_new_block_for_writing);
/// from then on shared behind an `Arc` between the manager and every task
/// holding a lock on the block. External holders may read every field and may
/// record the block's byte size via [`set_size`](Self::set_size); the lock
/// fields are managed exclusively by the manager.
#[derive(Debug)]
pub struct BlockInfo<L> {
    storage_level: L,
    class_tag: ClassTag,
    tell_master: bool,
    size: AtomicU64,
    reader_count: AtomicUsize,
    writer_task: AtomicI64,
}

impl<L: StorageLevel> BlockInfo<L> {
    /// A fresh record: zero bytes, no readers, no writer.
    pub fn new(storage_level: L, class_tag: ClassTag, tell_master: bool) -> Self {
        Self {
            storage_level,
            class_tag,
            tell_master,
            size: AtomicU64::new(0),
            reader_count: AtomicUsize::new(0),
            writer_task: AtomicI64::new(NO_WRITER),
        }
    }

    /// The storage level requested when the block was created. Carried for
    /// the surrounding store, never interpreted here.
    #[inline]
    pub fn storage_level(&self) -> &L {
        &self.storage_level
    }

    /// Type tag for the block's deserialized values.
    #[inline]
    pub fn class_tag(&self) -> ClassTag {
        self.class_tag
    }

    /// Whether the master should be told about changes to this block.
    #[inline]
    pub fn tell_master(&self) -> bool {
        self.tell_master
    }

    /// The block's size in bytes, zero until the writing task records it.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    /// Record the block's size in bytes. Called by the task holding the
    /// write lock once the bytes are materialized.
    #[inline]
    pub fn set_size(&self, size: u64) {
        self.size.store(size, Ordering::Relaxed);
    }

    /// Number of read locks currently held on this block.
    #[inline]
    pub fn reader_count(&self) -> usize {
        self.reader_count.load(Ordering::Relaxed)
    }

    /// The task attempt holding the write lock, or
    /// [`NO_WRITER`](crate::NO_WRITER).
    #[inline]
    pub fn writer_task(&self) -> TaskAttemptId {
        self.writer_task.load(Ordering::Relaxed)
    }

    // ---- Lock-field mutation, manager guard required ----

    pub(crate) fn add_reader(&self) {
        self.reader_count.fetch_add(1, Ordering::Relaxed);
        self.check_invariants();
    }

    pub(crate) fn remove_reader(&self) {
        self.remove_readers(1);
    }

    pub(crate) fn remove_readers(&self, count: usize) {
        let readers = self.reader_count.load(Ordering::Relaxed);
        assert!(
            readers >= count,
            "released {count} read locks on a block with only {readers} readers"
        );
        self.reader_count.store(readers - count, Ordering::Relaxed);
        self.check_invariants();
    }

    pub(crate) fn set_reader_count(&self, count: usize) {
        self.reader_count.store(count, Ordering::Relaxed);
        self.check_invariants();
    }

    pub(crate) fn set_writer_task(&self, task: TaskAttemptId) {
        self.writer_task.store(task, Ordering::Relaxed);
        self.check_invariants();
    }

    /// Readers and a writer must never coexist.
    fn check_invariants(&self) {
        let readers = self.reader_count.load(Ordering::Relaxed);
        let writer = self.writer_task.load(Ordering::Relaxed);
        assert!(
            writer == NO_WRITER || readers == 0,
            "block has {readers} readers while task {writer} holds the write lock"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Level;

    fn info() -> BlockInfo<Level> {
        BlockInfo::new(Level, ClassTag::of::<Vec<u8>>(), false)
    }

    #[test]
    fn test_fresh_record_is_unlocked() {
        let info = info();
        assert_eq!(info.reader_count(), 0);
        assert_eq!(info.writer_task(), NO_WRITER);
        assert_eq!(info.size(), 0);
        assert!(!info.tell_master());
    }

    #[test]
    fn test_reader_accounting() {
        let info = info();
        info.add_reader();
        info.add_reader();
        assert_eq!(info.reader_count(), 2);
        info.remove_reader();
        info.remove_readers(1);
        assert_eq!(info.reader_count(), 0);
    }

    #[test]
    fn test_size_is_observable_through_shared_handle() {
        let info = std::sync::Arc::new(info());
        let handle = std::sync::Arc::clone(&info);
        info.set_size(4096);
        assert_eq!(handle.size(), 4096);
    }

    #[test]
    #[should_panic(expected = "holds the write lock")]
    fn test_reader_under_writer_panics() {
        let info = info();
        info.set_writer_task(3);
        info.add_reader();
    }

    #[test]
    #[should_panic(expected = "holds the write lock")]
    fn test_writer_under_readers_panics() {
        let info = info();
        info.add_reader();
        info.set_writer_task(3);
    }

    #[test]
    #[should_panic(expected = "only 0 readers")]
    fn test_over_release_panics() {
        info().remove_reader();
    }

    #[test]
    fn test_class_tag_identity() {
        assert_eq!(ClassTag::of::<String>(), ClassTag::of::<String>());
        assert_ne!(ClassTag::of::<String>(), ClassTag::of::<Vec<u8>>());
        assert_eq!(ClassTag::of::<Vec<u8>>().name(), "Vec");
    }
}
