// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Coarse-grained ordered linked set: one mutex around a sorted
//! singly-linked list.
//!
//! The contention baseline the lock-free list is measured against. The
//! mutex is per-instance; independent sets never contend with each other.

use parking_lot::Mutex;

struct LNode<T> {
    value: T,
    next: Option<Box<LNode<T>>>,
}

struct Inner<T> {
    head: Option<Box<LNode<T>>>,
}

/// Mutex-protected ascending ordered set.
pub struct ListSet<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Ord + Copy> ListSet<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner { head: None }),
        }
    }

    /// Walk to the first link whose node is >= `value`.
    fn seek<'a>(link: &'a mut Option<Box<LNode<T>>>, value: T) -> &'a mut Option<Box<LNode<T>>> {
        let mut link = link;
        while link.as_ref().is_some_and(|n| n.value < value) {
            link = &mut link.as_mut().unwrap().next;
        }
        link
    }

    /// Insert `value` keeping ascending order; false on duplicate.
    pub fn insert(&self, value: T) -> bool {
        let mut inner = self.inner.lock();
        let link = Self::seek(&mut inner.head, value);
        if link.as_ref().is_some_and(|n| n.value == value) {
            return false;
        }
        let next = link.take();
        *link = Some(Box::new(LNode { value, next }));
        true
    }

    /// Remove `value`; false if absent.
    pub fn remove(&self, value: T) -> bool {
        let mut inner = self.inner.lock();
        let link = Self::seek(&mut inner.head, value);
        if link.as_ref().is_some_and(|n| n.value == value) {
            let removed = link.take().unwrap();
            *link = removed.next;
            true
        } else {
            false
        }
    }

    /// True if `value` is present.
    pub fn lookup(&self, value: T) -> bool {
        let inner = self.inner.lock();
        let mut cur = inner.head.as_deref();
        while let Some(node) = cur {
            if node.value == value {
                return true;
            }
            if node.value > value {
                return false;
            }
            cur = node.next.as_deref();
        }
        false
    }

    /// Drop every element.
    pub fn clear(&self) {
        // Box chains drop recursively; unlink iteratively so a long set
        // cannot blow the stack.
        let mut head = self.inner.lock().head.take();
        while let Some(mut node) = head {
            head = node.next.take();
        }
    }

    /// Verify strict ascending order.
    pub fn check_integrity(&self) -> bool {
        let inner = self.inner.lock();
        let mut cur = inner.head.as_deref();
        while let Some(node) = cur {
            if let Some(next) = node.next.as_deref() {
                if node.value >= next.value {
                    log::error!("[LISTSET] ordering violated");
                    return false;
                }
            }
            cur = node.next.as_deref();
        }
        true
    }
}

impl<T: Ord + Copy> Default for ListSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for ListSet<T> {
    fn drop(&mut self) {
        let mut head = self.inner.get_mut().head.take();
        while let Some(mut node) = head {
            head = node.next.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ordered_inserts() {
        let set = ListSet::new();
        for v in [5, 1, 9, 3, 7] {
            assert!(set.insert(v));
        }
        assert!(!set.insert(3));
        assert!(set.check_integrity());
        for v in [1, 3, 5, 7, 9] {
            assert!(set.lookup(v));
        }
        assert!(!set.lookup(2));
    }

    #[test]
    fn test_remove_head_middle_tail() {
        let set = ListSet::new();
        for v in 0..5 {
            set.insert(v);
        }
        assert!(set.remove(0));
        assert!(set.remove(2));
        assert!(set.remove(4));
        assert!(!set.remove(4));
        assert!(set.lookup(1));
        assert!(set.lookup(3));
        assert!(set.check_integrity());
    }

    #[test]
    fn test_clear() {
        let set = ListSet::new();
        for v in 0..100 {
            set.insert(v);
        }
        set.clear();
        assert!(!set.lookup(0));
        assert!(set.insert(0));
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let a = ListSet::new();
        let b = ListSet::new();
        a.insert(1);
        assert!(!b.lookup(1));
    }

    #[test]
    fn test_concurrent_disjoint_ops() {
        let set = Arc::new(ListSet::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let set = set.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        let v = t * 1000 + i;
                        assert!(set.insert(v));
                        assert!(set.lookup(v));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(set.check_integrity());
    }
}
