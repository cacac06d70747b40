// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Ambient task attempt id for the current thread.
//!
//! The host runtime installs a task attempt id on each worker thread before
//! running task code, via the RAII guard [`TaskContext`]. Lock operations read
//! the installed id through [`current_task_attempt_id`]; threads with no id
//! installed (driver threads, setup, shutdown, tests) are attributed to
//! [`NON_TASK_WRITER`](crate::NON_TASK_WRITER).
//!
//! The id is read once at the start of each lock operation, so it is stable
//! for the duration of a single call even if the guard is dropped concurrently
//! on the same thread (which would be a caller bug anyway).

use std::cell::Cell;

use crate::{NON_TASK_WRITER, TaskAttemptId};

thread_local! {
    static CURRENT_TASK: Cell<Option<TaskAttemptId>> = const { Cell::new(None) };
}

/// The task attempt id installed on the current thread, or
/// [`NON_TASK_WRITER`](crate::NON_TASK_WRITER) when none is installed.
pub fn current_task_attempt_id() -> TaskAttemptId {
    CURRENT_TASK.with(Cell::get).unwrap_or(NON_TASK_WRITER)
}

/// RAII guard installing a task attempt id on the current thread.
///
/// Dropping the guard restores whatever id was installed before, so guards
/// nest: a task that synchronously runs a sub-attempt can enter a second
/// context and fall back to its own id afterwards.
#[must_use = "dropping the guard immediately uninstalls the task attempt id"]
pub struct TaskContext {
    previous: Option<TaskAttemptId>,
}

impl TaskContext {
    /// Install `task` as the current thread's task attempt id.
    ///
    /// # Panics
    /// Panics if `task` is negative; the negative range is reserved for the
    /// sentinel values.
    pub fn enter(task: TaskAttemptId) -> Self {
        assert!(
            task >= 0,
            "task attempt ids are non-negative; {task} is in the reserved sentinel range"
        );
        let previous = CURRENT_TASK.with(|current| current.replace(Some(task)));
        Self { previous }
    }
}

impl Drop for TaskContext {
    fn drop(&mut self) {
        CURRENT_TASK.with(|current| current.set(self.previous));
    }
}
