// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hazard pointers: safe memory reclamation for the lock-free structures.
//!
//! Based on Maged Michael's "Hazard Pointers: Safe Memory Reclamation for
//! Lock-Free Objects" (IEEE TPDS 15(6), 2004). A thread advertises the
//! node it is about to dereference by storing it into one of its hazard
//! slots; a node pulled out of a structure is handed to [`retire`] and is
//! only freed once no slot anywhere advertises it.
//!
//! Assumptions, unchanged from the paper's simple variant:
//! - the number of threads is fixed and known up front;
//! - threads identify themselves by an id in `0..num_threads` and each id
//!   is used by exactly one thread at a time (the worker pool's stable ids
//!   satisfy this).
//!
//! Writing a slot does *not* transfer ownership - it only says "I am using
//! this pointer". Passing a node to `retire` *does* transfer ownership.
//!
//! Memory ordering: the publication protocol is
//!
//! ```text
//!        reader                      reclaimer
//!   slot.store(cur)           |
//!   fence(SeqCst)          ===|===   fence(SeqCst)
//!   revalidate *prev == cur   |      snapshot all slots
//! ```
//!
//! Either the reader's fence orders its store before the reclaimer's
//! snapshot (the node is seen and spared), or the unlink that preceded
//! retirement is visible to the reader's revalidation (which then
//! restarts). Slot traffic itself can be relaxed; the fences carry the
//! ordering.

use crate::config::MAX_RETIRED_PER_THREAD;
use crossbeam::utils::CachePadded;
use std::cell::UnsafeCell;
use std::collections::HashSet;
use std::sync::atomic::{fence, AtomicPtr, Ordering};

/// Per-thread slot array, padded to a cache line so that one thread's
/// stores do not invalidate its neighbors' lines.
struct Slots<T, const K: usize> {
    slots: [AtomicPtr<T>; K],
}

impl<T, const K: usize> Slots<T, K> {
    fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicPtr::new(std::ptr::null_mut())),
        }
    }
}

/// Per-thread retired set. Only the owning thread touches the set; other
/// threads never observe it.
struct Retired<T> {
    nodes: UnsafeCell<HashSet<*mut T>>,
}

impl<T> Retired<T> {
    fn new() -> Self {
        Self {
            nodes: UnsafeCell::new(HashSet::new()),
        }
    }
}

/// Hazard-pointer domain for nodes of type `T`, `K` slots per thread.
pub struct HazardPointers<T, const K: usize> {
    records: Box<[CachePadded<Slots<T, K>>]>,
    retired: Box<[CachePadded<Retired<T>>]>,
}

// SAFETY: the per-thread contract makes this sound:
// - `Slots` entries are atomics; any thread may load them, only the owner
//   stores (enforced by convention on `tid`, as in the worker pool).
// - `Retired` sets are only accessed by their owning thread (`retire` and
//   `scan` take the owner's `tid`), so the UnsafeCell is never shared.
// - Raw `*mut T` values cross threads only as opaque words until `scan`
//   frees them, which the fence protocol makes safe.
unsafe impl<T: Send, const K: usize> Send for HazardPointers<T, K> {}
unsafe impl<T: Send, const K: usize> Sync for HazardPointers<T, K> {}

impl<T, const K: usize> HazardPointers<T, K> {
    /// Domain for `num_threads` threads with ids `0..num_threads`.
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads > 0);
        Self {
            records: (0..num_threads)
                .map(|_| CachePadded::new(Slots::new()))
                .collect(),
            retired: (0..num_threads)
                .map(|_| CachePadded::new(Retired::new()))
                .collect(),
        }
    }

    pub fn num_threads(&self) -> usize {
        self.records.len()
    }

    /// Thread `tid`'s slot array. Storing a pointer here advertises an
    /// imminent dereference; the caller must fence (`SeqCst`) between the
    /// store and the revalidating load. Ownership is not transferred.
    pub fn slots(&self, tid: usize) -> &[AtomicPtr<T>; K] {
        &self.records[tid].slots
    }

    /// Clear all of `tid`'s slots (end of an operation).
    pub fn clear(&self, tid: usize) {
        for slot in &self.records[tid].slots {
            slot.store(std::ptr::null_mut(), Ordering::Relaxed);
        }
    }

    /// Transfer ownership of `node` (obtained from `Box::into_raw`, and
    /// already unlinked from the structure) to thread `tid`'s retired
    /// set. Triggers a reclamation scan once the set outgrows
    /// `MAX_RETIRED_PER_THREAD`. Returns the number of nodes freed.
    ///
    /// # Safety
    ///
    /// `node` must be a unique, unlinked `Box::into_raw` pointer retired
    /// exactly once, and `tid` must be the calling thread's id.
    pub unsafe fn retire(&self, tid: usize, node: *mut T) -> usize {
        let retired = &mut *self.retired[tid].nodes.get();
        retired.insert(node);
        if retired.len() > MAX_RETIRED_PER_THREAD {
            self.scan(tid)
        } else {
            0
        }
    }

    /// Free every node in `tid`'s retired set that no thread advertises.
    /// Returns the number freed.
    ///
    /// # Safety
    ///
    /// `tid` must be the calling thread's id.
    pub unsafe fn scan(&self, tid: usize) -> usize {
        // Order the snapshot after any reader's slot publication fence.
        fence(Ordering::SeqCst);

        let mut advertised: HashSet<*mut T> = HashSet::with_capacity(self.records.len() * K);
        for record in self.records.iter() {
            for slot in &record.slots {
                let p = slot.load(Ordering::Relaxed);
                if !p.is_null() {
                    advertised.insert(p);
                }
            }
        }

        let retired = &mut *self.retired[tid].nodes.get();
        let before = retired.len();
        retired.retain(|&p| {
            if advertised.contains(&p) {
                true
            } else {
                // SAFETY: p was retired exactly once (caller contract) and
                // no slot advertises it, so no reader can still reach it.
                unsafe { drop(Box::from_raw(p)) };
                false
            }
        });
        before - retired.len()
    }

    /// Number of nodes currently parked in `tid`'s retired set (tests).
    pub fn retired_len(&self, tid: usize) -> usize {
        // SAFETY: same per-thread contract as `retire`.
        unsafe { (*self.retired[tid].nodes.get()).len() }
    }
}

impl<T, const K: usize> Drop for HazardPointers<T, K> {
    fn drop(&mut self) {
        // Slots never own anything; the retired sets do. By the drop
        // contract all threads have stopped touching the structure, which
        // is equivalent to a scan with every slot null.
        for retired in self.retired.iter_mut() {
            let nodes = retired.nodes.get_mut();
            for &p in nodes.iter() {
                // SAFETY: each retired pointer came from Box::into_raw and
                // was retired exactly once; no live reader remains.
                unsafe { drop(Box::from_raw(p)) };
            }
            nodes.clear();
        }
    }
}
