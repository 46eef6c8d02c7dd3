// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Randomized concurrent workloads over the lock-free list and the
//! split-ordered hash table.
//!
//! Thread ids passed to the structures are the spawn indices; every
//! test joins all threads before inspecting quiescent state.

use harrier::sync::{LockFreeList, SplitOrderedTable};
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn list_mixed_ops_keep_integrity_across_rounds() {
    const THREADS: usize = 16;
    const OPS: usize = 1000;
    const ROUNDS: usize = 10;

    let list: Arc<LockFreeList<i32, i32>> = Arc::new(LockFreeList::new(THREADS));

    for round in 0..ROUNDS {
        let handles: Vec<_> = (0..THREADS)
            .map(|tid| {
                let list = list.clone();
                std::thread::spawn(move || {
                    let mut rng = fastrand::Rng::with_seed((round * THREADS + tid) as u64);
                    // Non-overlapping key stripes per thread.
                    let base = (tid as i32) * 100_000;
                    let mut mine: HashSet<i32> = HashSet::new();
                    for _ in 0..OPS {
                        let key = base + rng.i32(0..500);
                        if rng.bool() {
                            let inserted = list.insert(tid, key, key * 2);
                            assert_eq!(inserted, !mine.contains(&key));
                            mine.insert(key);
                        } else {
                            let removed = list.remove(tid, key);
                            assert_eq!(removed, mine.contains(&key));
                            mine.remove(&key);
                        }
                    }
                    mine
                })
            })
            .collect();

        let mut expected: HashSet<i32> = HashSet::new();
        for handle in handles {
            expected.extend(handle.join().unwrap());
        }

        assert!(list.check_integrity(), "round {}: ordering violated", round);

        // Live nodes == inserted minus removed, per thread model.
        let live: HashSet<i32> = list.collect_keys().into_iter().collect();
        assert_eq!(live, expected, "round {}: live set mismatch", round);

        // Reset for the next round.
        for key in live {
            assert!(list.remove(0, key));
        }
    }
}

#[test]
fn list_values_survive_duplicate_inserts() {
    let list: LockFreeList<i32, i32> = LockFreeList::new(1);
    assert!(list.insert(0, 1, 10));
    assert!(!list.insert(0, 1, 20));
    assert_eq!(list.get(0, 1), Some(10));

    assert!(list.remove(0, 1));
    assert!(!list.remove(0, 1));
    assert_eq!(list.get(0, 1), None);
}

#[test]
fn table_concurrent_disjoint_inserts_then_lookups() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 1000;

    let table: Arc<SplitOrderedTable<u32>> = Arc::new(SplitOrderedTable::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let table = table.clone();
            std::thread::spawn(move || {
                let mut rng = fastrand::Rng::with_seed(tid as u64);
                // Disjoint stripes; random draw without replacement.
                let base = (tid as u32) * 1_000_000;
                let mut keys = HashSet::new();
                while keys.len() < PER_THREAD {
                    keys.insert(base + rng.u32(0..100_000));
                }
                for &key in &keys {
                    assert!(table.insert(tid, key, key.wrapping_add(1)));
                }
                keys
            })
        })
        .collect();

    let mut all_keys = HashSet::new();
    for handle in handles {
        all_keys.extend(handle.join().unwrap());
    }
    assert_eq!(all_keys.len(), THREADS * PER_THREAD);
    assert_eq!(table.len(), THREADS * PER_THREAD);

    for &key in &all_keys {
        assert_eq!(table.lookup(0, key), Some(key.wrapping_add(1)));
    }

    // 1000 keys that were never inserted (stripes end well below the
    // next thread's base).
    for miss in 0..1000u32 {
        let key = 900_000 + miss;
        assert!(!all_keys.contains(&key));
        assert_eq!(table.lookup(0, key), None);
    }

    assert!(table.check_integrity());
}

#[test]
fn table_matches_reference_set_under_mixed_ops() {
    const THREADS: usize = 8;
    const OPS: usize = 2000;

    let table: Arc<SplitOrderedTable<u32>> = Arc::new(SplitOrderedTable::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let table = table.clone();
            std::thread::spawn(move || {
                let mut rng = fastrand::Rng::with_seed(0xC0FFEE + tid as u64);
                let base = (tid as u32) * 1_000_000;
                let mut mine = HashSet::new();
                for _ in 0..OPS {
                    let key = base + rng.u32(0..300);
                    if rng.bool() {
                        assert_eq!(table.insert(tid, key, key), !mine.contains(&key));
                        mine.insert(key);
                    } else {
                        assert_eq!(table.remove(tid, key), mine.contains(&key));
                        mine.remove(&key);
                    }
                }
                mine
            })
        })
        .collect();

    let mut expected = HashSet::new();
    for handle in handles {
        expected.extend(handle.join().unwrap());
    }

    // Lookups at quiescence match the reference model exactly.
    for tid in 0..THREADS {
        let base = (tid as u32) * 1_000_000;
        for offset in 0..300 {
            let key = base + offset;
            assert_eq!(
                table.lookup(0, key).is_some(),
                expected.contains(&key),
                "key {}",
                key
            );
        }
    }
    assert_eq!(table.len(), expected.len());
    assert!(table.check_integrity());
}

#[test]
fn table_grows_past_load_factor() {
    // Single-threaded but high volume: the bucket count must double once
    // count/buckets exceeds the load factor, and everything stays
    // reachable afterwards.
    let table: SplitOrderedTable<u32> = SplitOrderedTable::new(1);
    let before = table.buckets();
    let n = (before * 11) as u32; // load factor is 10
    for key in 0..n {
        assert!(table.insert(0, key, key));
    }
    assert!(table.buckets() > before, "bucket count never grew");
    for key in 0..n {
        assert_eq!(table.lookup(0, key), Some(key));
    }
}
