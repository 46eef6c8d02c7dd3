// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed worker pool with stable thread ids.
//!
//! Workers pull tasks from one FIFO channel. Each worker carries a stable
//! id in `0..num_workers`, published through [`WorkerPool::me`]; the
//! hazard-pointer domain and the stats rows are addressed by it.
//!
//! Stopping is drain-then-join: a stop sentinel per worker is enqueued
//! behind everything already submitted, so previously enqueued tasks all
//! run before the threads exit. `add_task` after stop is a no-op.

use crate::io::task::Task;
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

enum Message {
    Run(Task),
    Stop,
}

thread_local! {
    // 0 on threads that are not pool workers; such threads may only touch
    // id-addressed structures while worker 0 is quiescent.
    static WORKER_ID: Cell<usize> = const { Cell::new(0) };
}

pub struct WorkerPool {
    tx: Sender<Message>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    stopped: AtomicBool,
}

impl WorkerPool {
    /// Spawn `num_workers` workers with ids `0..num_workers`.
    pub fn new(num_workers: usize) -> std::io::Result<Self> {
        assert!(num_workers > 0);
        let (tx, rx): (Sender<Message>, Receiver<Message>) = unbounded();
        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("harrier-worker-{}", id))
                .spawn(move || {
                    WORKER_ID.with(|me| me.set(id));
                    while let Ok(message) = rx.recv() {
                        match message {
                            Message::Run(task) => task.run(),
                            Message::Stop => break,
                        }
                    }
                })?;
            workers.push(handle);
        }
        Ok(Self {
            tx,
            workers: Mutex::new(workers),
            size: num_workers,
            stopped: AtomicBool::new(false),
        })
    }

    /// The calling worker's stable id (0 on non-pool threads).
    pub fn me() -> usize {
        WORKER_ID.with(Cell::get)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Enqueue a task. Silently dropped once the pool is stopped.
    pub fn add_task(&self, task: Task) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        // A send can only fail once every worker has exited; the task is
        // dropped either way.
        let _ = self.tx.send(Message::Run(task));
    }

    /// Tasks currently queued (approximate).
    pub fn backlog(&self) -> usize {
        self.tx.len()
    }

    /// Drain the queue and join all workers. Idempotent; must not be
    /// called from a worker thread.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for _ in 0..self.size {
            let _ = self.tx.send(Message::Stop);
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if worker.join().is_err() {
                log::error!("[POOL] worker thread panicked");
            }
        }
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_tasks_run_before_stop_completes() {
        let pool = WorkerPool::new(4).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let h = hits.clone();
            pool.add_task(Task::once(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.stop();
        assert_eq!(hits.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_add_task_after_stop_is_noop() {
        let pool = WorkerPool::new(1).unwrap();
        pool.stop();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        pool.add_task(Task::once(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(pool.stopped());
    }

    #[test]
    fn test_worker_ids_are_stable_and_distinct() {
        let pool = WorkerPool::new(4).unwrap();
        let seen = Arc::new(Mutex::new(std::collections::HashSet::new()));
        // A barrier keeps all four workers busy at once so each id shows
        // up exactly once.
        let barrier = Arc::new(std::sync::Barrier::new(4));
        for _ in 0..4 {
            let seen = seen.clone();
            let barrier = barrier.clone();
            pool.add_task(Task::once(move || {
                barrier.wait();
                seen.lock().insert(WorkerPool::me());
            }));
        }
        pool.stop();
        let expected: std::collections::HashSet<usize> = (0..4).collect();
        assert_eq!(*seen.lock(), expected);
    }

    #[test]
    fn test_me_is_zero_off_pool() {
        assert_eq!(WorkerPool::me(), 0);
    }
}
