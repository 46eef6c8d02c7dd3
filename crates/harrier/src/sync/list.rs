// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lock-free ordered list (Harris/Michael) with hazard-pointer
//! reclamation.
//!
//! An ascending-key singly-linked chain whose links carry a logical
//! deletion mark in the LSB ([`MarkedPtr`]). Deletion is two-phase:
//!
//! 1. *logical*: CAS the victim's `next` from `n` to `mark(n)`;
//! 2. *physical*: CAS the predecessor's link from the victim to `n`.
//!
//! Searches opportunistically unlink any marked node they pass and retire
//! it to the hazard domain; the retiring side's unlink CAS and the reading
//! side's publish-fence-revalidate protocol (see [`hazard`]) together
//! guarantee a node is never freed while a traversal can still touch it,
//! which also closes the ABA window.
//!
//! Linearization points:
//! - insert: the successful CAS of the predecessor link to the new node;
//! - remove: the successful mark CAS;
//! - lookup: the validated re-read of the predecessor link that matched
//!   `cur` with an unmarked `next`.
//!
//! The start-pointer variants (`insert_at` & co.) run the same algorithm
//! from an arbitrary node instead of the list head; the split-ordered hash
//! table uses them with its bucket dummies.
//!
//! [`hazard`]: crate::sync::hazard

use crate::config::HAZARDS_PER_THREAD;
use crate::sync::hazard::HazardPointers;
use crate::sync::marked::MarkedPtr;
use std::sync::atomic::{fence, AtomicUsize, Ordering};

/// Chain node. The link word is a [`MarkedPtr`] and must only be touched
/// through atomic ops.
pub struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) next: AtomicUsize,
}

/// Cursor state produced by a search: `prev` is the link word that led to
/// `cur`, `next` is `cur`'s (unmarked) successor at observation time.
struct SearchCtx<K, V> {
    prev: *const AtomicUsize,
    cur: *mut Node<K, V>,
    next: MarkedPtr<Node<K, V>>,
}

impl<K, V> SearchCtx<K, V> {
    fn new() -> Self {
        Self {
            prev: std::ptr::null(),
            cur: std::ptr::null_mut(),
            next: MarkedPtr::null(),
        }
    }
}

/// Lock-free ordered set of `(key, value)` for a fixed thread count.
///
/// Every operation takes the calling thread's id (`0..num_threads`), which
/// addresses its hazard slots and retired list. The destructor is the only
/// non-thread-safe member: it requires all activity to have ceased.
pub struct LockFreeList<K, V> {
    head: AtomicUsize,
    hazards: HazardPointers<Node<K, V>, HAZARDS_PER_THREAD>,
}

// SAFETY: all cross-thread state is the atomic link words and the hazard
// domain; raw node pointers only travel between threads under the hazard
// protocol documented in `sync::hazard`.
unsafe impl<K: Send + Copy, V: Send + Copy> Send for LockFreeList<K, V> {}
unsafe impl<K: Send + Copy, V: Send + Copy> Sync for LockFreeList<K, V> {}

impl<K: Copy + Ord, V: Copy> LockFreeList<K, V> {
    /// List prepared for `num_threads` threads with ids `0..num_threads`.
    pub fn new(num_threads: usize) -> Self {
        Self {
            head: AtomicUsize::new(0),
            hazards: HazardPointers::new(num_threads),
        }
    }

    /// Insert `key` if absent. Returns false (and does not overwrite) if
    /// the key already exists.
    pub fn insert(&self, tid: usize, key: K, value: V) -> bool {
        !self.do_insert(tid, &self.head, key, value, false).is_null()
    }

    /// Remove `key` if present.
    pub fn remove(&self, tid: usize, key: K) -> bool {
        self.do_remove(tid, &self.head, key)
    }

    /// True if `key` is present.
    pub fn lookup(&self, tid: usize, key: K) -> bool {
        let mut ctx = SearchCtx::new();
        self.search(tid, &self.head, &key, &mut ctx)
    }

    /// Value stored under `key`, if present.
    pub fn get(&self, tid: usize, key: K) -> Option<V> {
        let mut ctx = SearchCtx::new();
        if self.search(tid, &self.head, &key, &mut ctx) {
            // SAFETY: search returned with ctx.cur protected by hazard
            // slot 0 and validated reachable.
            Some(unsafe { (*ctx.cur).value })
        } else {
            None
        }
    }

    // ---- start-pointer variants (used by the split-ordered table) ----

    /// Insert starting the search at `start` (may be null to grow a fresh
    /// chain rooted at the caller's link). On a duplicate returns the
    /// existing node when `return_existing`, else null; on success returns
    /// the new node. The returned address is stable for the list's
    /// lifetime as long as the node is never removed.
    pub fn insert_at(
        &self,
        tid: usize,
        start: *mut Node<K, V>,
        key: K,
        value: V,
        return_existing: bool,
    ) -> *mut Node<K, V> {
        let link = AtomicUsize::new(start as usize);
        self.do_insert(tid, &link, key, value, return_existing)
    }

    /// Remove `key`, searching from `start`.
    pub fn remove_at(&self, tid: usize, start: *mut Node<K, V>, key: K) -> bool {
        let link = AtomicUsize::new(start as usize);
        self.do_remove(tid, &link, key)
    }

    /// Lookup `key` from `start`, returning its value.
    pub fn get_at(&self, tid: usize, start: *mut Node<K, V>, key: K) -> Option<V> {
        let link = AtomicUsize::new(start as usize);
        let mut ctx = SearchCtx::new();
        if self.search(tid, &link, &key, &mut ctx) {
            // SAFETY: as in `get`.
            Some(unsafe { (*ctx.cur).value })
        } else {
            None
        }
    }

    // ---- internals ----

    fn do_insert(
        &self,
        tid: usize,
        start: &AtomicUsize,
        key: K,
        value: V,
        return_existing: bool,
    ) -> *mut Node<K, V> {
        let node = Box::into_raw(Box::new(Node {
            key,
            value,
            next: AtomicUsize::new(0),
        }));
        let mut ctx = SearchCtx::new();
        loop {
            if self.search(tid, start, &key, &mut ctx) {
                // SAFETY: `node` was never linked; we still own it.
                unsafe { drop(Box::from_raw(node)) };
                return if return_existing {
                    ctx.cur
                } else {
                    std::ptr::null_mut()
                };
            }
            // SAFETY: `node` is ours until the CAS below publishes it.
            unsafe { (*node).next.store(ctx.cur as usize, Ordering::Relaxed) };
            // SAFETY: ctx.prev points at a live link word (the start link
            // for the duration of this call, or a node protected by
            // hazard slot 1).
            let published = unsafe {
                (*ctx.prev)
                    .compare_exchange(
                        ctx.cur as usize,
                        node as usize,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
            };
            if published {
                return node;
            }
        }
    }

    fn do_remove(&self, tid: usize, start: &AtomicUsize, key: K) -> bool {
        let mut ctx = SearchCtx::new();
        loop {
            if !self.search(tid, start, &key, &mut ctx) {
                return false;
            }

            // Logical deletion: mark the victim's own link.
            let next = ctx.next;
            // SAFETY: ctx.cur is protected by hazard slot 0.
            let marked = unsafe {
                (*ctx.cur)
                    .next
                    .compare_exchange(
                        next.word(),
                        next.marked().word(),
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
            };
            if !marked {
                continue;
            }

            // Physical deletion; on failure a fresh search unlinks it.
            // SAFETY: ctx.prev as in do_insert; retire transfers the
            // unlinked node's ownership to the hazard domain.
            unsafe {
                if (*ctx.prev)
                    .compare_exchange(
                        ctx.cur as usize,
                        next.word(),
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    self.hazards.retire(tid, ctx.cur);
                } else {
                    self.search(tid, start, &key, &mut ctx);
                }
            }
            return true;
        }
    }

    /// Walk from `start` looking for `key`, maintaining `(prev, cur,
    /// next)` under the hazard protocol. On a hit returns true with
    /// `ctx.cur` on the match; on a miss returns false with `ctx.cur` on
    /// the first node past the insertion point (possibly null).
    fn search(
        &self,
        tid: usize,
        start: &AtomicUsize,
        key: &K,
        ctx: &mut SearchCtx<K, V>,
    ) -> bool {
        let slots = self.hazards.slots(tid);

        'retry: loop {
            let mut prev: *const AtomicUsize = start;
            // SAFETY (this loop): `prev` always aims at a live link word -
            // initially `start`, afterwards the `next` field of a node
            // protected by hazard slot 1. `cur` is dereferenced only after
            // the publish-fence-revalidate handshake shows it still
            // reachable from `prev`, hence not yet reclaimable.
            let mut cur =
                MarkedPtr::<Node<K, V>>::from_word(unsafe { (*prev).load(Ordering::Acquire) })
                    .ptr();

            while !cur.is_null() {
                slots[0].store(cur, Ordering::Relaxed);
                fence(Ordering::SeqCst);
                if unsafe { (*prev).load(Ordering::Acquire) } != cur as usize {
                    continue 'retry;
                }

                let next = MarkedPtr::from_word(unsafe { (*cur).next.load(Ordering::Acquire) });
                if next.is_marked() {
                    // cur is logically deleted: try to unlink it here.
                    let unlinked = unsafe {
                        (*prev)
                            .compare_exchange(
                                cur as usize,
                                next.unmarked().word(),
                                Ordering::SeqCst,
                                Ordering::SeqCst,
                            )
                            .is_ok()
                    };
                    if !unlinked {
                        continue 'retry;
                    }
                    unsafe { self.hazards.retire(tid, cur) };
                    cur = next.ptr();
                } else {
                    let cur_key = unsafe { (*cur).key };
                    if unsafe { (*prev).load(Ordering::Acquire) } != cur as usize {
                        continue 'retry;
                    }
                    if cur_key >= *key {
                        ctx.prev = prev;
                        ctx.cur = cur;
                        ctx.next = next;
                        return cur_key == *key;
                    }

                    prev = unsafe { &(*cur).next as *const AtomicUsize };
                    // Rotate hazards: cur becomes the protected
                    // predecessor; the next iteration claims slot 0 for
                    // its own cur.
                    let hold = slots[0].load(Ordering::Relaxed);
                    slots[0].store(slots[1].load(Ordering::Relaxed), Ordering::Relaxed);
                    slots[1].store(hold, Ordering::Relaxed);
                    fence(Ordering::SeqCst);

                    cur = next.ptr();
                }
            }

            ctx.prev = prev;
            ctx.cur = std::ptr::null_mut();
            ctx.next = MarkedPtr::null();
            return false;
        }
    }

    /// Verify strict ascending key order over the whole chain.
    ///
    /// Quiescent only: callers must guarantee no concurrent mutation.
    pub fn check_integrity(&self) -> bool {
        let mut cur = MarkedPtr::<Node<K, V>>::from_word(self.head.load(Ordering::Acquire)).ptr();
        let mut prev_key: Option<K> = None;
        while !cur.is_null() {
            // SAFETY: quiescence contract; every chained node is live.
            let (key, next) = unsafe {
                (
                    (*cur).key,
                    MarkedPtr::<Node<K, V>>::from_word((*cur).next.load(Ordering::Acquire)),
                )
            };
            if let Some(p) = prev_key {
                if p >= key {
                    log::error!("[LIST] integrity violation: key order not strictly ascending");
                    return false;
                }
            }
            prev_key = Some(key);
            cur = next.ptr();
        }
        true
    }

    /// Keys of live (not logically deleted) nodes, in chain order.
    ///
    /// Quiescent only.
    pub fn collect_keys(&self) -> Vec<K> {
        let mut keys = Vec::new();
        let mut cur = MarkedPtr::<Node<K, V>>::from_word(self.head.load(Ordering::Acquire)).ptr();
        while !cur.is_null() {
            // SAFETY: quiescence contract.
            let next = unsafe {
                MarkedPtr::<Node<K, V>>::from_word((*cur).next.load(Ordering::Acquire))
            };
            if !next.is_marked() {
                keys.push(unsafe { (*cur).key });
            }
            cur = next.ptr();
        }
        keys
    }
}

impl<K, V> Drop for LockFreeList<K, V> {
    fn drop(&mut self) {
        // Not thread-safe: requires quiescence. Nodes still chained are
        // owned by the list; nodes already unlinked sit in the hazard
        // domain's retired sets and are freed by its Drop.
        let mut cur = MarkedPtr::<Node<K, V>>::from_word(*self.head.get_mut()).ptr();
        while !cur.is_null() {
            // SAFETY: exclusive access; each chained node is a unique
            // Box::into_raw allocation.
            let node = unsafe { Box::from_raw(cur) };
            cur = MarkedPtr::<Node<K, V>>::from_word(node.next.load(Ordering::Relaxed)).ptr();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lookup_remove() {
        let list: LockFreeList<i32, i32> = LockFreeList::new(1);
        assert!(list.insert(0, 5, 50));
        assert!(list.insert(0, 1, 10));
        assert!(list.insert(0, 3, 30));
        assert!(!list.insert(0, 3, 99), "duplicate insert must fail");

        assert!(list.lookup(0, 1));
        assert_eq!(list.get(0, 3), Some(30), "duplicate insert must not overwrite");
        assert!(!list.lookup(0, 2));

        assert!(list.remove(0, 3));
        assert!(!list.remove(0, 3), "double remove must fail");
        assert!(!list.lookup(0, 3));
        assert!(list.check_integrity());
        assert_eq!(list.collect_keys(), vec![1, 5]);
    }

    #[test]
    fn test_ascending_order_maintained() {
        let list: LockFreeList<i32, ()> = LockFreeList::new(1);
        for key in [9, 2, 7, 4, 1, 8, 3] {
            assert!(list.insert(0, key, ()));
        }
        assert!(list.check_integrity());
        assert_eq!(list.collect_keys(), vec![1, 2, 3, 4, 7, 8, 9]);
    }

    #[test]
    fn test_remove_head_and_tail() {
        let list: LockFreeList<i32, ()> = LockFreeList::new(1);
        for key in 0..5 {
            list.insert(0, key, ());
        }
        assert!(list.remove(0, 0));
        assert!(list.remove(0, 4));
        assert_eq!(list.collect_keys(), vec![1, 2, 3]);
        assert!(list.check_integrity());
    }

    #[test]
    fn test_start_pointer_variants() {
        let list: LockFreeList<u32, u32> = LockFreeList::new(1);
        // Bootstrap a floating chain root, as the hash table does for
        // bucket 0: insert with a null start.
        let root = list.insert_at(0, std::ptr::null_mut(), 0, 0, true);
        assert!(!root.is_null());

        let n10 = list.insert_at(0, root, 10, 100, false);
        assert!(!n10.is_null());
        assert!(list.insert_at(0, root, 10, 200, false).is_null());
        // return_existing hands back the original node.
        assert_eq!(list.insert_at(0, root, 10, 200, true), n10);

        assert_eq!(list.get_at(0, root, 10), Some(100));
        assert!(list.remove_at(0, root, 10));
        assert!(!list.remove_at(0, root, 10));
        assert_eq!(list.get_at(0, root, 10), None);

        // The floating chain is not reachable from head; free it by hand.
        assert!(list.remove_at(0, root, 0));
    }
}
