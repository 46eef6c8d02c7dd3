// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-slot circular buffer that overwrites the oldest unread entry.
//!
//! Single-owner (`&mut self`) structure used by benchmark-style drivers:
//! the writer never blocks, and a reader that falls behind loses the
//! oldest entries rather than stalling the writer.

/// One slot: the value plus whether it has been read already.
struct Slot<T> {
    value: T,
    unread: bool,
}

/// Overwriting circular buffer with `slots` entries.
pub struct CircularBuffer<T> {
    slots: Vec<Slot<T>>,
    read_idx: usize,
    write_idx: usize,
}

impl<T: Copy + Default> CircularBuffer<T> {
    /// A buffer with `slots` entries (falls back to 10 for zero, matching
    /// the historical behavior of the benchmark drivers).
    pub fn new(slots: usize) -> Self {
        let slots = if slots == 0 { 10 } else { slots };
        Self {
            slots: (0..slots)
                .map(|_| Slot {
                    value: T::default(),
                    unread: false,
                })
                .collect(),
            read_idx: 0,
            write_idx: 0,
        }
    }

    fn next(&self, idx: usize) -> usize {
        if idx + 1 == self.slots.len() {
            0
        } else {
            idx + 1
        }
    }

    /// Store `value`. If the buffer is full the oldest unread entry is
    /// overwritten and the read position advances past it.
    pub fn write(&mut self, value: T) {
        let after = self.next(self.write_idx);
        if self.slots[after].unread && self.write_idx == self.read_idx {
            self.read_idx = self.next(self.read_idx);
        }
        self.slots[self.write_idx].value = value;
        self.slots[self.write_idx].unread = true;
        self.write_idx = after;
    }

    /// Take the oldest unread entry, or `None` if everything was read.
    /// Always advances, like its read-pointer ancestor.
    pub fn read(&mut self) -> Option<T> {
        let slot = &mut self.slots[self.read_idx];
        let out = if slot.unread { Some(slot.value) } else { None };
        slot.unread = false;
        self.read_idx = self.next(self.read_idx);
        out
    }

    /// Drop everything unread and realign the read position.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.unread = false;
        }
        self.read_idx = self.write_idx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_keeps_newest() {
        // Three slots, ten writes: the survivors are 7 and 8 (9 sits
        // under the write position, one lap ahead of the read position).
        let mut buf = CircularBuffer::new(3);
        for i in 0..10 {
            buf.write(i);
        }
        assert_eq!(buf.read(), Some(7));
        assert_eq!(buf.read(), Some(8));
    }

    #[test]
    fn test_read_empty_advances() {
        let mut buf: CircularBuffer<i32> = CircularBuffer::new(4);
        assert_eq!(buf.read(), None);
        // The read position always advances, so a write that lands behind
        // it only surfaces after a full lap.
        buf.write(1);
        assert_eq!(buf.read(), None);
        assert_eq!(buf.read(), None);
        assert_eq!(buf.read(), None);
        assert_eq!(buf.read(), Some(1));
    }

    #[test]
    fn test_fifo_within_capacity() {
        let mut buf = CircularBuffer::new(5);
        for i in 0..4 {
            buf.write(i);
        }
        for i in 0..4 {
            assert_eq!(buf.read(), Some(i));
        }
    }

    #[test]
    fn test_clear() {
        let mut buf = CircularBuffer::new(3);
        buf.write(1);
        buf.write(2);
        buf.clear();
        assert_eq!(buf.read(), None);
        buf.write(9);
        assert_eq!(buf.read(), Some(9));
    }

    #[test]
    fn test_zero_slots_falls_back() {
        let mut buf = CircularBuffer::new(0);
        for i in 0..10 {
            buf.write(i);
        }
        for i in 0..10 {
            assert_eq!(buf.read(), Some(i));
        }
    }
}
