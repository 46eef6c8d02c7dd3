// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-shot notification for synchronous calls.
//!
//! An atomic flag answers the hot path without a lock; the condvar only
//! comes into play once a waiter actually sleeps. Used by the client's
//! blocking `send`/`connect` wrappers - which is exactly why those must
//! never run on a worker thread of the manager they are waiting on.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct Notification {
    fired: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

impl Notification {
    pub fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            lock: Mutex::new(()),
            cv: Condvar::new(),
        }
    }

    /// Fire the notification. Idempotent.
    pub fn notify(&self) {
        let _guard = self.lock.lock();
        self.fired.store(true, Ordering::Release);
        self.cv.notify_all();
    }

    /// Block until [`notify`](Self::notify) has been called.
    pub fn wait(&self) {
        if self.fired.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.lock.lock();
        while !self.fired.load(Ordering::Acquire) {
            self.cv.wait(&mut guard);
        }
    }

    /// Non-blocking observer.
    pub fn notified(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Default for Notification {
    fn default() -> Self {
        Self::new()
    }
}
