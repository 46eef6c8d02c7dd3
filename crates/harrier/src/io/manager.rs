// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The service manager: one event loop shared by any number of
//! protocols.
//!
//! Protocols install acceptors before [`run`](ServiceManager::run); `run`
//! starts them, drives the poll loop on the calling thread, and only
//! returns after the stop sequence has fully completed. [`stop`] is
//! idempotent and thread-safe: the first caller performs the teardown
//! (close acceptors, stop the I/O manager, signal completion), later and
//! concurrent callers wait for it.
//!
//! Request handlers must use [`request_stop`] instead of [`stop`] - they
//! run on pool workers, and the teardown joins the pool.
//!
//! [`stop`]: ServiceManager::stop
//! [`request_stop`]: ServiceManager::request_stop

use crate::clock::{Clock, MonotonicClock};
use crate::io::acceptor::{AcceptCallback, Acceptor};
use crate::io::reactor::IoManager;
use parking_lot::{Condvar, Mutex};
use std::io;
use std::sync::Arc;

struct StopState {
    requested: bool,
    stopped: bool,
}

pub struct ServiceManager {
    io: IoManager,
    num_workers: usize,
    acceptors: Mutex<Vec<Arc<Acceptor>>>,
    state: Mutex<StopState>,
    cv_stopped: Condvar,
    clock: Arc<dyn Clock>,
}

impl ServiceManager {
    pub fn new(num_workers: usize) -> io::Result<Self> {
        Self::with_clock(num_workers, Arc::new(MonotonicClock::new()))
    }

    /// Manager with an injected clock (tests drive a
    /// [`ManualClock`](crate::clock::ManualClock) through the stats path).
    pub fn with_clock(num_workers: usize, clock: Arc<dyn Clock>) -> io::Result<Self> {
        Ok(Self {
            io: IoManager::new(num_workers)?,
            num_workers,
            acceptors: Mutex::new(Vec::new()),
            state: Mutex::new(StopState {
                requested: false,
                stopped: false,
            }),
            cv_stopped: Condvar::new(),
            clock,
        })
    }

    /// Install `callback` for connect requests on `port`. Returns the
    /// bound port (useful with port 0). Must precede [`run`](Self::run).
    pub fn register_acceptor(&self, port: u16, callback: AcceptCallback) -> io::Result<u16> {
        let acceptor = Acceptor::bind(port, callback, self.io.shared())?;
        let bound = acceptor.local_port();
        self.acceptors.lock().push(acceptor);
        Ok(bound)
    }

    /// Accept connections and serve until stopped. Blocks; guaranteed to
    /// return only after the stop sequence completed.
    pub fn run(&self) {
        {
            let acceptors = self.acceptors.lock();
            for acceptor in acceptors.iter() {
                if let Err(e) = acceptor.start() {
                    log::error!(
                        "[MANAGER] cannot start acceptor on port {}: {}",
                        acceptor.local_port(),
                        e
                    );
                    self.io.request_stop();
                }
            }
        }

        self.io.poll();

        // The loop broke - via stop() on another thread or request_stop()
        // from a handler. Finish (or wait out) the teardown.
        self.stop();
    }

    /// Tear everything down: close acceptors, stop the I/O manager (which
    /// drains queued callbacks and joins the workers), then release every
    /// caller blocked here or in [`run`](Self::run).
    ///
    /// Must not be called from a pool worker; see
    /// [`request_stop`](Self::request_stop).
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if state.requested {
                while !state.stopped {
                    self.cv_stopped.wait(&mut state);
                }
                return;
            }
            state.requested = true;
        }

        let acceptors = self.acceptors.lock().clone();
        for acceptor in &acceptors {
            acceptor.close();
        }

        self.io.stop();

        let mut state = self.state.lock();
        state.stopped = true;
        self.cv_stopped.notify_all();
        log::info!("[MANAGER] stopped");
    }

    /// Break the event loop without blocking or joining; the thread in
    /// [`run`](Self::run) completes the teardown. Safe from workers - this
    /// is what `/quit` uses.
    pub fn request_stop(&self) {
        log::info!("[MANAGER] stop requested");
        self.io.request_stop();
    }

    /// True once any stop path has been taken.
    pub fn stopped(&self) -> bool {
        self.state.lock().requested || self.io.stopped()
    }

    // accessors

    pub fn io_manager(&self) -> &IoManager {
        &self.io
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

impl Drop for ServiceManager {
    fn drop(&mut self) {
        // Safe even if run() was never called; idempotent otherwise.
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_stop_without_run() {
        let manager = ServiceManager::new(1).unwrap();
        assert!(!manager.stopped());
        manager.stop();
        assert!(manager.stopped());
        manager.stop(); // idempotent
    }

    #[test]
    fn test_run_returns_after_stop() {
        let manager = Arc::new(ServiceManager::new(2).unwrap());
        let runner = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.run())
        };
        std::thread::sleep(Duration::from_millis(30));
        manager.stop();
        runner.join().unwrap();
        assert!(manager.stopped());
    }

    #[test]
    fn test_request_stop_lets_run_finish_teardown() {
        let manager = Arc::new(ServiceManager::new(2).unwrap());
        let runner = {
            let manager = manager.clone();
            std::thread::spawn(move || manager.run())
        };
        std::thread::sleep(Duration::from_millis(30));
        manager.request_stop();
        runner.join().unwrap();
        assert!(manager.stopped());
    }

    #[test]
    fn test_concurrent_stops() {
        let manager = Arc::new(ServiceManager::new(1).unwrap());
        let stoppers: Vec<_> = (0..4)
            .map(|_| {
                let manager = manager.clone();
                std::thread::spawn(move || manager.stop())
            })
            .collect();
        for s in stoppers {
            s.join().unwrap();
        }
        assert!(manager.stopped());
    }
}
