// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MCS queue spinlock.
//!
//! Contending threads form an explicit queue: each spins on a flag in its
//! *own* node instead of a shared word, so handoff causes one cache-line
//! transfer rather than a stampede. The node is supplied by the caller
//! (one per thread per lock) and must outlive the critical section, which
//! the guard's borrow enforces.

use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

/// Queue node; one per thread per acquisition.
pub struct McsNode {
    next: AtomicPtr<McsNode>,
    locked: AtomicBool,
}

impl McsNode {
    pub fn new() -> Self {
        Self {
            next: AtomicPtr::new(std::ptr::null_mut()),
            locked: AtomicBool::new(false),
        }
    }
}

impl Default for McsNode {
    fn default() -> Self {
        Self::new()
    }
}

/// The lock: a single tail pointer into the waiter queue.
pub struct McsLock {
    tail: AtomicPtr<McsNode>,
}

// SAFETY: queued nodes are only reached through the tail exchange and the
// per-node next/locked atomics; the guard keeps each node borrowed (hence
// alive and unmoved) until release.
unsafe impl Send for McsLock {}
unsafe impl Sync for McsLock {}

impl McsLock {
    pub fn new() -> Self {
        Self {
            tail: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    /// Acquire with the caller's queue node. Spins while a predecessor
    /// holds the lock; returns a guard that releases on drop.
    pub fn lock<'a>(&'a self, node: &'a mut McsNode) -> McsGuard<'a> {
        node.next.store(std::ptr::null_mut(), Ordering::Relaxed);
        node.locked.store(false, Ordering::Relaxed);

        let node_ptr = node as *mut McsNode;
        let pred = self.tail.swap(node_ptr, Ordering::AcqRel);
        if !pred.is_null() {
            node.locked.store(true, Ordering::Relaxed);
            // SAFETY: the predecessor cannot release its node until it has
            // handed the lock to us (it spins on our linkage in unlock).
            unsafe { (*pred).next.store(node_ptr, Ordering::Release) };
            while node.locked.load(Ordering::Acquire) {
                std::hint::spin_loop();
            }
        }
        McsGuard { lock: self, node }
    }
}

impl Default for McsLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the lock; dropping releases it to the queue successor.
pub struct McsGuard<'a> {
    lock: &'a McsLock,
    node: &'a mut McsNode,
}

impl Drop for McsGuard<'_> {
    fn drop(&mut self) {
        let node_ptr = self.node as *mut McsNode;
        if self.node.next.load(Ordering::Acquire).is_null() {
            // No visible successor: try to swing the tail back to empty.
            if self
                .lock
                .tail
                .compare_exchange(
                    node_ptr,
                    std::ptr::null_mut(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }
            // A successor is mid-enqueue; wait for it to link itself.
            while self.node.next.load(Ordering::Acquire).is_null() {
                std::hint::spin_loop();
            }
        }
        let next = self.node.next.load(Ordering::Acquire);
        // SAFETY: the successor spins in lock() until this store, keeping
        // its node alive and in place.
        unsafe { (*next).locked.store(false, Ordering::Release) };
    }
}
