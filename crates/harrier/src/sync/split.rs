// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lock-free split-ordered hash table (Shalev & Shavit) over the
//! lock-free list.
//!
//! The table is one ordered list keyed by *split-order* keys plus a
//! resizable directory of bucket entry points:
//!
//! - a regular entry for key `k` sorts at `reverse_bits(k | 0x8000_0000)`;
//! - bucket `b`'s *dummy* node sorts at `reverse_bits(b)`.
//!
//! Setting the MSB before reversing gives every regular key a 1 in the low
//! bit and every dummy a 0, so a bucket's dummy always sorts immediately
//! before that bucket's entries, and when the bucket count doubles each
//! new bucket's dummy lands between its parent's existing entries. Growing
//! is therefore a single CAS on `buckets_size`; no entry ever moves.
//!
//! The directory is a two-level segment table: segments are allocated
//! lazily and installed with a publish-once CAS (losers free their
//! speculative segment); a published dummy's address is stable for the
//! table's lifetime. The chain is rooted at bucket 0's dummy - the
//! underlying list's own head stays empty.

use crate::config::{INITIAL_BUCKETS, MAX_LOAD, SEGMENT_COUNT, SEGMENT_SIZE};
use crate::sync::list::{LockFreeList, Node};
use crate::sync::marked::MarkedPtr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

type Bucket<V> = AtomicPtr<Node<u32, V>>;

/// Lazily-allocated directory segment of bucket entry points.
struct Segment<V> {
    buckets: Box<[Bucket<V>]>,
}

impl<V> Segment<V> {
    fn new() -> Self {
        Self {
            buckets: (0..SEGMENT_SIZE)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
        }
    }
}

/// Lock-free hash map from `u32` keys to `V`, amortized O(1) per
/// operation, sized at construction for a fixed thread count.
pub struct SplitOrderedTable<V> {
    list: LockFreeList<u32, V>,
    segments: Box<[AtomicPtr<Segment<V>>]>,
    buckets_size: AtomicUsize,
    count: AtomicUsize,
}

impl<V: Copy + Default> SplitOrderedTable<V> {
    /// Table prepared for `num_threads` threads with ids `0..num_threads`.
    pub fn new(num_threads: usize) -> Self {
        Self {
            list: LockFreeList::new(num_threads),
            segments: (0..SEGMENT_COUNT)
                .map(|_| AtomicPtr::new(std::ptr::null_mut()))
                .collect(),
            buckets_size: AtomicUsize::new(INITIAL_BUCKETS),
            count: AtomicUsize::new(0),
        }
    }

    /// Insert `key` if absent; false on duplicate (no overwrite).
    pub fn insert(&self, tid: usize, key: u32, value: V) -> bool {
        let size = self.buckets_size.load(Ordering::Acquire);
        let index = key as usize % size;
        let bucket = self.bucket_or_init(tid, index);
        if self
            .list
            .insert_at(tid, bucket, regular_key(key), value, false)
            .is_null()
        {
            return false;
        }

        // Amortized growth: one attempt, losers simply observe the new
        // size on their next operation.
        let grown = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if grown / size > MAX_LOAD && size * 2 <= self.capacity() {
            let _ = self.buckets_size.compare_exchange(
                size,
                size * 2,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        true
    }

    /// Remove `key` if present.
    pub fn remove(&self, tid: usize, key: u32) -> bool {
        let size = self.buckets_size.load(Ordering::Acquire);
        let bucket = self.bucket_or_init(tid, key as usize % size);
        if !self.list.remove_at(tid, bucket, regular_key(key)) {
            return false;
        }
        self.count.fetch_sub(1, Ordering::AcqRel);
        true
    }

    /// Value stored under `key`, if present.
    pub fn lookup(&self, tid: usize, key: u32) -> Option<V> {
        let size = self.buckets_size.load(Ordering::Acquire);
        let bucket = self.bucket_or_init(tid, key as usize % size);
        self.list.get_at(tid, bucket, regular_key(key))
    }

    /// Entries currently in the table (approximate under concurrency).
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current bucket count (tests observe growth through this).
    pub fn buckets(&self) -> usize {
        self.buckets_size.load(Ordering::Acquire)
    }

    /// Total bucket capacity of the directory.
    fn capacity(&self) -> usize {
        SEGMENT_COUNT * SEGMENT_SIZE
    }

    /// Verify the underlying split-order chain is strictly ascending.
    ///
    /// Quiescent only.
    pub fn check_integrity(&self) -> bool {
        let root = self.get_bucket(0);
        if root.is_null() {
            return true;
        }
        let mut prev_key: Option<u32> = None;
        let mut cur = root;
        while !cur.is_null() {
            // SAFETY: quiescence contract; the chain from the root dummy
            // only contains live nodes.
            let (key, next) = unsafe {
                (
                    (*cur).key,
                    MarkedPtr::<Node<u32, V>>::from_word((*cur).next.load(Ordering::Acquire)),
                )
            };
            if let Some(p) = prev_key {
                if p >= key {
                    log::error!("[TABLE] split-order chain not strictly ascending");
                    return false;
                }
            }
            prev_key = Some(key);
            cur = next.ptr();
        }
        true
    }

    // ---- bucket directory ----

    /// Bucket `index`'s dummy, initializing it (and, recursively, its
    /// parent chain) on first touch.
    fn bucket_or_init(&self, tid: usize, index: usize) -> *mut Node<u32, V> {
        let bucket = self.get_bucket(index);
        if !bucket.is_null() {
            return bucket;
        }
        self.initialize_bucket(tid, index)
    }

    fn initialize_bucket(&self, tid: usize, index: usize) -> *mut Node<u32, V> {
        let start = if index == 0 {
            // Bucket 0 roots the whole chain; its dummy is inserted with a
            // null start and the list head stays untouched.
            std::ptr::null_mut()
        } else {
            let parent = parent_of(index);
            self.bucket_or_init(tid, parent)
        };

        // Racing initializers all reach the same node: the winner inserts
        // the dummy, losers get the existing one back.
        let dummy = self
            .list
            .insert_at(tid, start, dummy_key(index as u32), V::default(), true);
        self.set_bucket(index, dummy);
        dummy
    }

    fn get_bucket(&self, index: usize) -> *mut Node<u32, V> {
        let segment = self.segments[index / SEGMENT_SIZE].load(Ordering::Acquire);
        if segment.is_null() {
            return std::ptr::null_mut();
        }
        // SAFETY: a published segment is never freed while the table
        // lives.
        unsafe { (*segment).buckets[index % SEGMENT_SIZE].load(Ordering::Acquire) }
    }

    fn set_bucket(&self, index: usize, node: *mut Node<u32, V>) {
        let slot = &self.segments[index / SEGMENT_SIZE];
        let mut segment = slot.load(Ordering::Acquire);
        if segment.is_null() {
            let fresh = Box::into_raw(Box::new(Segment::new()));
            match slot.compare_exchange(
                std::ptr::null_mut(),
                fresh,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => segment = fresh,
                Err(published) => {
                    // Lost the install race: free the speculative segment.
                    // SAFETY: `fresh` never escaped this thread.
                    unsafe { drop(Box::from_raw(fresh)) };
                    segment = published;
                }
            }
        }
        // Publish-once: every racer writes the same stable dummy address.
        // SAFETY: `segment` is published and immortal (see get_bucket).
        unsafe { (*segment).buckets[index % SEGMENT_SIZE].store(node, Ordering::Release) };
    }
}

impl<V> Drop for SplitOrderedTable<V> {
    fn drop(&mut self) {
        // The chain is rooted at bucket 0's dummy, not at the list head,
        // so the list's own Drop frees nothing; walk it here. Quiescence
        // is the caller's contract.
        let root = {
            let segment = self.segments[0].load(Ordering::Relaxed);
            if segment.is_null() {
                std::ptr::null_mut()
            } else {
                // SAFETY: published segments stay live until this Drop.
                unsafe { (*segment).buckets[0].load(Ordering::Relaxed) }
            }
        };
        let mut cur = root;
        while !cur.is_null() {
            // SAFETY: exclusive access; every chained node is a unique
            // Box::into_raw allocation not also present in a retired set
            // (retired nodes were unlinked first).
            let node = unsafe { Box::from_raw(cur) };
            cur = MarkedPtr::<Node<u32, V>>::from_word(node.next.load(Ordering::Relaxed)).ptr();
        }

        for slot in self.segments.iter() {
            let segment = slot.load(Ordering::Relaxed);
            if !segment.is_null() {
                // SAFETY: segments are uniquely owned by the table.
                unsafe { drop(Box::from_raw(segment)) };
            }
        }
    }
}

/// Split-order key of a regular entry: MSB set, then bit-reversed.
fn regular_key(key: u32) -> u32 {
    (key | 0x8000_0000).reverse_bits()
}

/// Split-order key of bucket `index`'s dummy.
fn dummy_key(index: u32) -> u32 {
    index.reverse_bits()
}

/// Parent bucket: `index` with its highest set bit cleared.
fn parent_of(index: usize) -> usize {
    debug_assert!(index > 0);
    index & !(1 << (usize::BITS - 1 - index.leading_zeros()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_transforms() {
        // Regular keys carry the reversed MSB in bit 0; dummies don't.
        assert_eq!(regular_key(0) & 1, 1);
        assert_eq!(dummy_key(0), 0);
        assert_eq!(dummy_key(1), 0x8000_0000);
        // A bucket's dummy sorts before every regular key of that bucket.
        for key in [0u32, 5, 17, 1 << 20] {
            assert!(dummy_key(key % 8) < regular_key(key));
        }
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of(1), 0);
        assert_eq!(parent_of(2), 0);
        assert_eq!(parent_of(3), 1);
        assert_eq!(parent_of(6), 2);
        assert_eq!(parent_of(12_345), 12_345 - 8192);
    }

    #[test]
    fn test_insert_lookup_remove() {
        let table: SplitOrderedTable<u32> = SplitOrderedTable::new(1);
        assert!(table.insert(0, 12, 120));
        assert!(table.insert(0, 7, 70));
        assert!(!table.insert(0, 12, 999), "duplicate insert must fail");

        assert_eq!(table.lookup(0, 12), Some(120), "no overwrite on duplicate");
        assert_eq!(table.lookup(0, 7), Some(70));
        assert_eq!(table.lookup(0, 8), None);
        assert_eq!(table.len(), 2);

        assert!(table.remove(0, 12));
        assert!(!table.remove(0, 12), "double remove must fail");
        assert_eq!(table.lookup(0, 12), None);
        assert_eq!(table.len(), 1);
        assert!(table.check_integrity());
    }

    #[test]
    fn test_keys_colliding_across_buckets() {
        let table: SplitOrderedTable<u32> = SplitOrderedTable::new(1);
        // Same bucket (mod INITIAL_BUCKETS) and spread-out buckets both
        // resolve through the shared chain.
        let keys = [
            3u32,
            3 + INITIAL_BUCKETS as u32,
            3 + 2 * INITIAL_BUCKETS as u32,
            9_999,
            123_456,
        ];
        for &k in &keys {
            assert!(table.insert(0, k, k.wrapping_mul(2)));
        }
        for &k in &keys {
            assert_eq!(table.lookup(0, k), Some(k.wrapping_mul(2)));
        }
        assert!(table.check_integrity());
    }

    #[test]
    fn test_zero_key() {
        let table: SplitOrderedTable<u32> = SplitOrderedTable::new(1);
        assert!(table.insert(0, 0, 42));
        assert_eq!(table.lookup(0, 0), Some(42));
        assert!(table.remove(0, 0));
        assert_eq!(table.lookup(0, 0), None);
    }
}
