// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-worker request-rate ring: completions over the trailing second.
//!
//! Each worker owns a row of 20 slots, each covering 50 ms of the wrapped
//! second; a completion lands in the slot its timestamp maps to, either
//! bumping the count (slot still current) or restarting it (slot gone
//! stale since its last update). The reader sums every fresh cell across
//! all rows.
//!
//! Only worker `i` writes row `i`; any thread may read all rows. Counts
//! use relaxed atomics - a reader racing a writer can observe a slightly
//! stale figure, which is fine for coarse statistics.

use crate::clock::{Ticks, TICKS_PER_SEC};
use crate::config::STATS_SLOTS;
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

struct Slot {
    count: AtomicU32,
    last_update: AtomicU64,
}

type Row = CachePadded<[Slot; STATS_SLOTS]>;

pub struct RequestStats {
    rows: Box<[Row]>,
}

impl RequestStats {
    /// One row per worker, ids `0..num_workers`.
    pub fn new(num_workers: usize) -> Self {
        let rows = (0..num_workers)
            .map(|_| {
                CachePadded::new(std::array::from_fn(|_| Slot {
                    count: AtomicU32::new(0),
                    last_update: AtomicU64::new(0),
                }))
            })
            .collect();
        Self { rows }
    }

    /// Record that worker `tid` completed one request at `now`.
    pub fn finished_request(&self, tid: usize, now: Ticks) {
        let slots = STATS_SLOTS as u64;
        let index = ((u128::from(now) * u128::from(slots) / u128::from(TICKS_PER_SEC))
            % u128::from(slots)) as usize;
        let slot = &self.rows[tid][index];

        let last = slot.last_update.load(Ordering::Relaxed);
        if now.saturating_sub(last) * slots < TICKS_PER_SEC {
            // Slot still covers the current 50 ms interval.
            slot.count.fetch_add(1, Ordering::Relaxed);
        } else {
            slot.count.store(1, Ordering::Relaxed);
            slot.last_update.store(now, Ordering::Relaxed);
        }
    }

    /// Requests completed in the second ending roughly at `now`.
    pub fn reqs_last_sec(&self, now: Ticks) -> u32 {
        let mut total = 0u32;
        for row in self.rows.iter() {
            for slot in row.iter() {
                let last = slot.last_update.load(Ordering::Relaxed);
                if now.saturating_sub(last) < TICKS_PER_SEC {
                    total = total.wrapping_add(slot.count.load(Ordering::Relaxed));
                }
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    const SLOT_TICKS: u64 = TICKS_PER_SEC / STATS_SLOTS as u64; // 50 ms

    #[test]
    fn test_counts_within_one_second() {
        let stats = RequestStats::new(1);
        let clock = ManualClock::new();
        clock.set(SLOT_TICKS); // keep slot 0's epoch value distinct

        for _ in 0..200 {
            stats.finished_request(0, clock.now());
        }
        assert_eq!(stats.reqs_last_sec(clock.now()), 200);
    }

    #[test]
    fn test_counts_expire_after_a_second() {
        let stats = RequestStats::new(1);
        let clock = ManualClock::new();
        clock.set(SLOT_TICKS);

        for _ in 0..200 {
            stats.finished_request(0, clock.now());
        }
        clock.advance(2 * TICKS_PER_SEC);
        assert_eq!(stats.reqs_last_sec(clock.now()), 0);
    }

    #[test]
    fn test_slot_reset_on_wrap() {
        let stats = RequestStats::new(1);
        let clock = ManualClock::new();
        clock.set(SLOT_TICKS);
        stats.finished_request(0, clock.now());
        stats.finished_request(0, clock.now());

        // Same slot one full second later: the stale count restarts at 1.
        clock.advance(TICKS_PER_SEC);
        stats.finished_request(0, clock.now());
        assert_eq!(stats.reqs_last_sec(clock.now()), 1);
    }

    #[test]
    fn test_spread_across_slots() {
        let stats = RequestStats::new(2);
        let clock = ManualClock::new();
        clock.set(SLOT_TICKS);

        // 20 completions per worker, one per slot.
        for _ in 0..STATS_SLOTS {
            stats.finished_request(0, clock.now());
            stats.finished_request(1, clock.now());
            clock.advance(SLOT_TICKS);
        }
        // Monotonicity bound: never more than actually completed in the
        // trailing second.
        assert!(stats.reqs_last_sec(clock.now()) <= 2 * STATS_SLOTS as u32);
        assert!(stats.reqs_last_sec(clock.now()) > 0);
    }
}
