// SPDX-FileCopyrightText: Copyright (c) 2024-2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Property-based tests for the locking protocol.
//!
//! Random sequences of legal operations are replayed against a mirror model
//! of the holdings. After every step the manager must agree with the model
//! and the cross-map bookkeeping invariants must hold. Operations that the
//! model knows would suspend forever in a single-threaded replay (blocking
//! behind a writer that can never release) are skipped; operations the task
//! does not legitimately hold are skipped rather than exercised, since
//! over-release is a loud protocol violation covered by the unit tests.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;

use crate::NO_WRITER;
use crate::testing::{TestBlockId, block, create_test_manager, new_test_info, with_task};

const TASKS: i64 = 3;
const KEYS: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

#[derive(Debug, Clone)]
enum Op {
    LockNew { task: i64, key: usize },
    Read { task: i64, key: usize },
    Write { task: i64, key: usize },
    Unlock { task: i64, key: usize },
    Downgrade { task: i64, key: usize },
    Remove { task: i64, key: usize },
    ReleaseAll { task: i64 },
    Get { key: usize },
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let task = 0..TASKS;
    let key = 0..KEYS.len();
    prop_oneof![
        3 => (task.clone(), key.clone()).prop_map(|(task, key)| Op::LockNew { task, key }),
        4 => (task.clone(), key.clone()).prop_map(|(task, key)| Op::Read { task, key }),
        3 => (task.clone(), key.clone()).prop_map(|(task, key)| Op::Write { task, key }),
        5 => (task.clone(), key.clone()).prop_map(|(task, key)| Op::Unlock { task, key }),
        2 => (task.clone(), key.clone()).prop_map(|(task, key)| Op::Downgrade { task, key }),
        2 => (task.clone(), key.clone()).prop_map(|(task, key)| Op::Remove { task, key }),
        1 => task.clone().prop_map(|task| Op::ReleaseAll { task }),
        2 => key.prop_map(|key| Op::Get { key }),
        1 => Just(Op::Clear),
    ]
}

/// Mirror of the holdings the test believes each task has.
#[derive(Default)]
struct Model {
    exists: HashSet<usize>,
    reads: HashMap<i64, HashMap<usize, usize>>,
    writes: HashMap<i64, HashSet<usize>>,
}

impl Model {
    fn reset() -> Self {
        let mut model = Self::default();
        for task in 0..TASKS {
            model.reads.insert(task, HashMap::new());
            model.writes.insert(task, HashSet::new());
        }
        model
    }

    fn writer_of(&self, key: usize) -> Option<i64> {
        self.writes
            .iter()
            .find(|(_, held)| held.contains(&key))
            .map(|(task, _)| *task)
    }

    fn readers_of(&self, key: usize) -> usize {
        self.reads
            .values()
            .map(|reads| reads.get(&key).copied().unwrap_or(0))
            .sum()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_random_ops_match_model(ops in proptest::collection::vec(op_strategy(), 1..120)) {
        let manager = create_test_manager();
        let mut model = Model::reset();
        for task in 0..TASKS {
            manager.register_task(task).unwrap();
        }

        for op in ops {
            match op {
                Op::LockNew { task, key } => {
                    // Suspending behind another task's writer can never
                    // finish in a single-threaded replay.
                    if model.writer_of(key).is_none() {
                        let won = with_task(task, || {
                            manager.lock_new_block_for_writing(block(KEYS[key]), new_test_info())
                        });
                        prop_assert_eq!(won, !model.exists.contains(&key));
                        if won {
                            model.exists.insert(key);
                            model.writes.get_mut(&task).unwrap().insert(key);
                        } else {
                            *model.reads.get_mut(&task).unwrap().entry(key).or_insert(0) += 1;
                        }
                    }
                }
                Op::Read { task, key } => {
                    let got = with_task(task, || {
                        manager.lock_for_reading(&block(KEYS[key]), false).is_some()
                    });
                    let expected =
                        model.exists.contains(&key) && model.writer_of(key).is_none();
                    prop_assert_eq!(got, expected);
                    if got {
                        *model.reads.get_mut(&task).unwrap().entry(key).or_insert(0) += 1;
                    }
                }
                Op::Write { task, key } => {
                    let got = with_task(task, || {
                        manager.lock_for_writing(&block(KEYS[key]), false).is_some()
                    });
                    let expected = model.exists.contains(&key)
                        && model.writer_of(key).is_none()
                        && model.readers_of(key) == 0;
                    prop_assert_eq!(got, expected);
                    if got {
                        model.writes.get_mut(&task).unwrap().insert(key);
                    }
                }
                Op::Unlock { task, key } => {
                    let holds_write = model.writes[&task].contains(&key);
                    let holds_read =
                        model.reads[&task].get(&key).copied().unwrap_or(0) > 0;
                    if holds_write || holds_read {
                        with_task(task, || manager.unlock(&block(KEYS[key]))).unwrap();
                        if holds_write {
                            model.writes.get_mut(&task).unwrap().remove(&key);
                        } else {
                            let reads = model.reads.get_mut(&task).unwrap();
                            let count = reads.get_mut(&key).unwrap();
                            *count -= 1;
                            if *count == 0 {
                                reads.remove(&key);
                            }
                        }
                    }
                }
                Op::Downgrade { task, key } => {
                    if model.writes[&task].contains(&key) {
                        with_task(task, || manager.downgrade_lock(&block(KEYS[key]))).unwrap();
                        model.writes.get_mut(&task).unwrap().remove(&key);
                        *model.reads.get_mut(&task).unwrap().entry(key).or_insert(0) += 1;
                    }
                }
                Op::Remove { task, key } => {
                    if model.writes[&task].contains(&key) {
                        with_task(task, || manager.remove_block(&block(KEYS[key]))).unwrap();
                        model.writes.get_mut(&task).unwrap().remove(&key);
                        model.exists.remove(&key);
                    }
                }
                Op::ReleaseAll { task } => {
                    let released: HashSet<TestBlockId> =
                        manager.release_all_locks_for_task(task).into_iter().collect();
                    let mut expected: HashSet<TestBlockId> = model.writes[&task]
                        .iter()
                        .map(|key| block(KEYS[*key]))
                        .collect();
                    expected.extend(model.reads[&task].keys().map(|key| block(KEYS[*key])));
                    prop_assert_eq!(released, expected);
                    model.writes.insert(task, HashSet::new());
                    model.reads.insert(task, HashMap::new());
                    manager.register_task(task).unwrap();
                }
                Op::Get { key } => {
                    prop_assert_eq!(
                        manager.get(&block(KEYS[key])).is_some(),
                        model.exists.contains(&key)
                    );
                }
                Op::Clear => {
                    manager.clear();
                    model = Model::reset();
                    for task in 0..TASKS {
                        manager.register_task(task).unwrap();
                    }
                }
            }
            manager.check_consistency();
        }

        // Final per-block counters must match the model.
        for (key, name) in KEYS.iter().copied().enumerate() {
            if let Some(info) = manager.get(&block(name)) {
                prop_assert_eq!(info.reader_count(), model.readers_of(key));
                prop_assert_eq!(
                    info.writer_task(),
                    model.writer_of(key).unwrap_or(NO_WRITER)
                );
            }
        }
    }
}
